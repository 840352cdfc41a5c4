/* Interfaz que usa el fsck para leer la imagen. A diferencia de `Image`,
el backend no valida nada al abrir: tiene que poder leer imágenes rotas. */

use crate::layout::{
    entries_per_block, DirEntryDisk, InodeDisk, SuperblockDisk, DIR_ENTRY_LEN, INODE_RECORD_LEN,
    INODE_TABLE_BLOCK, MAX_NAME, ROOT_INODE, SUPERBLOCK_LEN,
};

use super::fsck_types::Dirent;

pub trait FsckBackend {
    fn image_len(&self) -> usize;
    fn load_superblock(&self) -> Option<SuperblockDisk>;
    /// Inodos que caben dentro de la imagen, hasta `total_inodes`.
    fn load_all_inodes(&self) -> Vec<InodeDisk>;
    fn read_block(&self, block: u32) -> Option<&[u8]>;
    /// Todas las ranuras del bloque del directorio raíz, libres incluidas.
    fn read_root_dir(&self) -> Vec<Dirent>;
}

/// Backend sobre los bytes crudos de una imagen.
pub struct RawImage<'a> {
    bytes: &'a [u8],
}

impl<'a> RawImage<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn block_size(&self) -> Option<usize> {
        let sb = self.load_superblock()?;
        match sb.block_size as usize {
            0 => None,
            bs => Some(bs),
        }
    }
}

impl FsckBackend for RawImage<'_> {
    fn image_len(&self) -> usize {
        self.bytes.len()
    }

    fn load_superblock(&self) -> Option<SuperblockDisk> {
        self.bytes
            .get(..SUPERBLOCK_LEN)
            .map(SuperblockDisk::decode)
    }

    fn load_all_inodes(&self) -> Vec<InodeDisk> {
        let (Some(sb), Some(bs)) = (self.load_superblock(), self.block_size()) else {
            return Vec::new();
        };
        let table = INODE_TABLE_BLOCK as usize * bs;

        (0..sb.total_inodes as usize)
            .map_while(|i| {
                let start = table + i * INODE_RECORD_LEN;
                self.bytes
                    .get(start..start + INODE_RECORD_LEN)
                    .map(InodeDisk::decode)
            })
            .collect()
    }

    fn read_block(&self, block: u32) -> Option<&[u8]> {
        let bs = self.block_size()?;
        let start = (block as usize).checked_mul(bs)?;
        self.bytes.get(start..start.checked_add(bs)?)
    }

    fn read_root_dir(&self) -> Vec<Dirent> {
        let Some(root) = self.load_all_inodes().get(ROOT_INODE as usize).copied() else {
            return Vec::new();
        };
        let Some(block) = root.data_block().and_then(|b| self.read_block(b)) else {
            return Vec::new();
        };

        (0..entries_per_block(block.len() as u32))
            .map(|slot| {
                let off = slot * DIR_ENTRY_LEN;
                let entry = DirEntryDisk::decode(&block[off..off + DIR_ENTRY_LEN]);
                Dirent {
                    slot,
                    inode: entry.inode,
                    name: entry.name(),
                    terminated: entry.name[..MAX_NAME].contains(&0),
                }
            })
            .collect()
    }
}
