// src/layout.rs
//
// Formato en disco de MiniFS. Todos los enteros son little-endian y los
// registros están empaquetados (sin relleno), igual que en las imágenes ya
// existentes.

// -----------------------------------------------------------------------------
// Constantes
// -----------------------------------------------------------------------------

pub const BLOCK_SIZE: u32 = 4096;
/// Valor guardado en el campo `inode_size` del superblock.
pub const INODE_SIZE: u32 = 128;
/// Paso real de la tabla de inodos: tamaño del registro empaquetado.
pub const INODE_RECORD_LEN: usize = 74;
pub const SUPERBLOCK_LEN: usize = 44;
pub const DIR_ENTRY_LEN: usize = 32;
pub const MAX_NAME: usize = 28;
/// El nombre se guarda terminado en NUL.
pub const MAX_NAME_LEN: usize = MAX_NAME - 1;
pub const DIRECT_POINTERS: usize = 12;
pub const FS_NAME_LEN: usize = 16;

pub const SUPERBLOCK_BLOCK: u32 = 0;
/// Los bloques 1 y 2 quedan reservados.
pub const INODE_TABLE_BLOCK: u32 = 3;
pub const ROOT_INODE: u32 = 0;

pub const DEFAULT_TOTAL_BLOCKS: u32 = 128;
pub const DEFAULT_TOTAL_INODES: u32 = 16;
pub const DEFAULT_FS_NAME: &str = "MiniExt2FS";

pub const S_IFMT: u16 = 0xF000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFREG: u16 = 0x8000;
pub const PERM_MASK: u16 = 0o7777;

/// Cantidad máxima de entradas en el bloque del directorio raíz.
pub const fn entries_per_block(block_size: u32) -> usize {
    block_size as usize / DIR_ENTRY_LEN
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

/// Copia `name` a un campo de ancho fijo, rellenando con NUL.
/// Trunca para dejar siempre el NUL final.
fn put_c_string(field: &mut [u8], name: &str) {
    field.fill(0);
    let bytes = name.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
}

fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// -----------------------------------------------------------------------------
// Estructuras en disco
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperblockDisk {
    pub total_blocks: u32,
    pub total_inodes: u32,
    pub block_size: u32,
    pub inode_size: u32,
    pub free_blocks: u32,
    pub free_inodes: u32,
    pub first_data_block: u32,
    pub fs_name: [u8; FS_NAME_LEN],
}

impl SuperblockDisk {
    /// `buf` debe tener al menos `SUPERBLOCK_LEN` bytes.
    pub fn decode(buf: &[u8]) -> Self {
        let mut fs_name = [0u8; FS_NAME_LEN];
        fs_name.copy_from_slice(&buf[28..28 + FS_NAME_LEN]);
        Self {
            total_blocks: u32_at(buf, 0),
            total_inodes: u32_at(buf, 4),
            block_size: u32_at(buf, 8),
            inode_size: u32_at(buf, 12),
            free_blocks: u32_at(buf, 16),
            free_inodes: u32_at(buf, 20),
            first_data_block: u32_at(buf, 24),
            fs_name,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.total_blocks);
        put_u32(buf, 4, self.total_inodes);
        put_u32(buf, 8, self.block_size);
        put_u32(buf, 12, self.inode_size);
        put_u32(buf, 16, self.free_blocks);
        put_u32(buf, 20, self.free_inodes);
        put_u32(buf, 24, self.first_data_block);
        buf[28..28 + FS_NAME_LEN].copy_from_slice(&self.fs_name);
    }

    pub fn label(&self) -> String {
        c_string(&self.fs_name)
    }

    pub fn set_label(&mut self, label: &str) {
        put_c_string(&mut self.fs_name, label);
    }

    /// Bloques que ocupa la tabla de inodos.
    pub fn inode_table_blocks(&self) -> u32 {
        self.first_data_block.saturating_sub(INODE_TABLE_BLOCK)
    }
}

/// Tipo de un inodo, decodificado de los bits de `mode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InodeKind {
    Free,
    RegularFile,
    Directory,
}

impl InodeKind {
    /// `None` si los bits de tipo no corresponden a nada conocido.
    pub fn from_mode(mode: u16) -> Option<Self> {
        if mode == 0 {
            return Some(InodeKind::Free);
        }
        match mode & S_IFMT {
            S_IFDIR => Some(InodeKind::Directory),
            S_IFREG => Some(InodeKind::RegularFile),
            _ => None,
        }
    }

    pub fn type_bits(self) -> u16 {
        match self {
            InodeKind::Free => 0,
            InodeKind::RegularFile => S_IFREG,
            InodeKind::Directory => S_IFDIR,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InodeDisk {
    pub mode: u16,
    pub uid: u16,
    pub size: u32,
    pub blocks: u32,
    pub direct: [u32; DIRECT_POINTERS],
    /// Reservado; siempre 0 en este diseño.
    pub indirect: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub links_count: u16,
}

impl InodeDisk {
    /// Inodo recién asignado: punteros en cero, un enlace, ambas marcas de tiempo en `now`.
    pub fn new(kind: InodeKind, perm: u16, now: u32) -> Self {
        Self {
            mode: kind.type_bits() | (perm & PERM_MASK),
            ctime: now,
            mtime: now,
            links_count: 1,
            ..Self::default()
        }
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut direct = [0u32; DIRECT_POINTERS];
        for (i, d) in direct.iter_mut().enumerate() {
            *d = u32_at(buf, 12 + i * 4);
        }
        Self {
            mode: u16_at(buf, 0),
            uid: u16_at(buf, 2),
            size: u32_at(buf, 4),
            blocks: u32_at(buf, 8),
            direct,
            indirect: u32_at(buf, 60),
            ctime: u32_at(buf, 64),
            mtime: u32_at(buf, 68),
            links_count: u16_at(buf, 72),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put_u16(buf, 0, self.mode);
        put_u16(buf, 2, self.uid);
        put_u32(buf, 4, self.size);
        put_u32(buf, 8, self.blocks);
        for (i, d) in self.direct.iter().enumerate() {
            put_u32(buf, 12 + i * 4, *d);
        }
        put_u32(buf, 60, self.indirect);
        put_u32(buf, 64, self.ctime);
        put_u32(buf, 68, self.mtime);
        put_u16(buf, 72, self.links_count);
    }

    pub fn kind(&self) -> Option<InodeKind> {
        InodeKind::from_mode(self.mode)
    }

    pub fn is_free(&self) -> bool {
        self.mode == 0
    }

    pub fn perm(&self) -> u16 {
        self.mode & PERM_MASK
    }

    /// Único bloque de datos del inodo, si tiene.
    pub fn data_block(&self) -> Option<u32> {
        match self.direct[0] {
            0 => None,
            b => Some(b),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DirEntryDisk {
    /// 0 marca una ranura libre.
    pub inode: u32,
    pub name: [u8; MAX_NAME],
}

impl DirEntryDisk {
    pub const EMPTY: Self = Self {
        inode: 0,
        name: [0; MAX_NAME],
    };

    pub fn new(inode: u32, name: &str) -> Self {
        let mut entry = Self {
            inode,
            name: [0; MAX_NAME],
        };
        put_c_string(&mut entry.name, name);
        entry
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut name = [0u8; MAX_NAME];
        name.copy_from_slice(&buf[4..4 + MAX_NAME]);
        Self {
            inode: u32_at(buf, 0),
            name,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.inode);
        buf[4..4 + MAX_NAME].copy_from_slice(&self.name);
    }

    pub fn is_free(&self) -> bool {
        self.inode == 0
    }

    pub fn name(&self) -> String {
        c_string(&self.name)
    }

    /// Compara sin asignar memoria; el campo en disco puede no tener NUL.
    pub fn name_matches(&self, name: &str) -> bool {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
        &self.name[..end] == name.as_bytes()
    }
}

impl std::fmt::Debug for DirEntryDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirEntryDisk")
            .field("inode", &self.inode)
            .field("name", &self.name())
            .finish()
    }
}
