// src/fs.rs
//
// Operaciones sobre archivos: traduce pedidos por ruta (o por número de
// inodo, para FUSE) a cambios sobre la imagen.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info};

use crate::alloc::Allocator;
use crate::dir::{self, DirEntry};
use crate::error::{FsError, Result};
use crate::image::Image;
use crate::layout::{InodeDisk, InodeKind, MAX_NAME_LEN, PERM_MASK, ROOT_INODE};

pub fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

/// Reglas para nombres nuevos. Las búsquedas no pasan por aquí: un nombre
/// inválido simplemente no se encuentra.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(|c| c == '/' || c == '\0') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong(name.len()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathTarget<'a> {
    Root,
    Entry(&'a str),
}

/// Solo hay un nivel: "/" es la raíz y "/nombre" una entrada de ella.
fn parse_path(path: &str) -> Result<PathTarget<'_>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Ok(PathTarget::Root);
    }
    if trimmed.contains('/') {
        return Err(FsError::Unsupported("rutas con más de un componente"));
    }
    Ok(PathTarget::Entry(trimmed))
}

/// Campos públicos de un inodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub ino: u32,
    pub kind: InodeKind,
    pub perm: u16,
    pub uid: u16,
    pub size: u32,
    pub blocks: u32,
    pub link_count: u16,
    pub created_time: u32,
    pub modified_time: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub block_size: u32,
    pub name_max: u32,
}

pub struct Minifs {
    image: Image,
    alloc: Allocator,
    backing: Option<PathBuf>,
}

// -----------------------------------------------------------------------------
// Apertura y persistencia
// -----------------------------------------------------------------------------

impl Minifs {
    /// Valida la imagen completa antes de aceptar operaciones. Los contadores
    /// libres del superblock se recalculan; cualquier otra inconsistencia
    /// se reporta como `Corrupt`.
    pub fn from_image(mut image: Image) -> Result<Self> {
        let alloc = Allocator::scan(&image)?;
        dir::check_dense(&image)?;
        alloc.reconcile_counters(&mut image)?;
        Ok(Self {
            image,
            alloc,
            backing: None,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_image(Image::from_bytes(bytes)?)
    }

    /// Carga la imagen del archivo `path` a memoria; `sync` la vuelve a escribir ahí.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let mut fs = Self::from_bytes(bytes).inspect_err(|e| {
            error!("imagen {:?} rechazada: {e}", path);
        })?;
        fs.backing = Some(path.to_path_buf());

        let sb = fs.image.superblock();
        info!(
            "imagen {:?} abierta: {:?}, {} bloques ({} libres), {} inodos ({} libres)",
            path,
            sb.label(),
            sb.total_blocks,
            sb.free_blocks,
            sb.total_inodes,
            sb.free_inodes
        );
        Ok(fs)
    }

    pub fn backing_path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    /// Escribe el buffer completo al archivo de respaldo, si hay uno.
    pub fn sync(&self) -> Result<()> {
        let Some(path) = &self.backing else {
            return Ok(());
        };
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(self.image.as_bytes())?;
        file.sync_all()?;
        debug!("imagen sincronizada en {:?}", path);
        Ok(())
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.image.into_bytes()
    }

    pub fn label(&self) -> String {
        self.image.superblock().label()
    }

    pub fn statfs(&self) -> FsStats {
        let sb = self.image.superblock();
        FsStats {
            total_blocks: sb.total_blocks,
            free_blocks: sb.free_blocks,
            total_inodes: sb.total_inodes,
            free_inodes: sb.free_inodes,
            block_size: sb.block_size,
            name_max: MAX_NAME_LEN as u32,
        }
    }
}

// -----------------------------------------------------------------------------
// Consultas
// -----------------------------------------------------------------------------

impl Minifs {
    /// Inodo asignado `ino`; libre o fuera de la tabla es `NotFound`.
    fn live_inode(&self, ino: u32) -> Result<(InodeDisk, InodeKind)> {
        if ino >= self.image.total_inodes() {
            return Err(FsError::NotFound);
        }
        let inode = self.image.load_inode(ino)?;
        match inode.kind() {
            None => Err(FsError::corrupt(format!(
                "inodo {}: modo {:#06x} desconocido",
                ino, inode.mode
            ))),
            Some(InodeKind::Free) => Err(FsError::NotFound),
            Some(kind) => Ok((inode, kind)),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<u32> {
        dir::lookup(&self.image, name)
    }

    pub fn resolve(&self, path: &str) -> Result<u32> {
        match parse_path(path)? {
            PathTarget::Root => Ok(ROOT_INODE),
            PathTarget::Entry(name) => self.lookup(name),
        }
    }

    pub fn attributes(&self, path: &str) -> Result<FileAttributes> {
        self.attributes_at(self.resolve(path)?)
    }

    pub fn attributes_at(&self, ino: u32) -> Result<FileAttributes> {
        let (inode, kind) = self.live_inode(ino)?;
        Ok(FileAttributes {
            ino,
            kind,
            perm: inode.perm(),
            uid: inode.uid,
            size: inode.size,
            blocks: inode.blocks,
            link_count: inode.links_count,
            created_time: inode.ctime,
            modified_time: inode.mtime,
        })
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.list_directory_at(self.resolve(path)?)
    }

    /// Los directorios creados con `mkdir` existen pero siempre están vacíos.
    pub fn list_directory_at(&self, ino: u32) -> Result<Vec<DirEntry>> {
        if ino == ROOT_INODE {
            return dir::list_directory(&self.image);
        }
        match self.live_inode(ino)?.1 {
            InodeKind::Directory => Ok(Vec::new()),
            InodeKind::RegularFile | InodeKind::Free => Err(FsError::NotADirectory),
        }
    }

    pub fn read(&self, path: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.read_at(self.resolve(path)?, offset, length)
    }

    pub fn read_at(&self, ino: u32, offset: u64, length: usize) -> Result<Vec<u8>> {
        let (inode, kind) = self.live_inode(ino)?;
        match kind {
            InodeKind::RegularFile => {}
            InodeKind::Directory | InodeKind::Free => return Err(FsError::NotAFile),
        }

        let size = inode.size as u64;
        if offset >= size {
            return Ok(Vec::new());
        }
        if size > self.image.block_size() as u64 {
            return Err(FsError::corrupt(format!(
                "inodo {}: tamaño {} mayor que un bloque",
                ino, size
            )));
        }
        let n = (length as u64).min(size - offset) as usize;

        let b = inode.data_block().ok_or_else(|| {
            FsError::corrupt(format!("inodo {}: tamaño {} sin bloque de datos", ino, size))
        })?;
        let start = offset as usize;
        Ok(self.image.block(b)?[start..start + n].to_vec())
    }
}

// -----------------------------------------------------------------------------
// Escritura de contenido
// -----------------------------------------------------------------------------

impl Minifs {
    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let ino = self.resolve(path)?;
        self.write_at(ino, offset, data)
    }

    /// Los archivos son de un solo bloque: nunca se escribe más allá de él.
    pub fn write_at(&mut self, ino: u32, offset: u64, data: &[u8]) -> Result<usize> {
        let (mut inode, kind) = self.live_inode(ino)?;
        match kind {
            InodeKind::RegularFile => {}
            InodeKind::Directory | InodeKind::Free => return Err(FsError::NotAFile),
        }

        let block_size = self.image.block_size() as u64;
        let end = offset.saturating_add(data.len() as u64);
        if end > block_size {
            return Err(FsError::OutOfRange(format!(
                "escritura [{}, {}) excede el bloque de {} bytes",
                offset, end, block_size
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }

        let b = match inode.data_block() {
            Some(b) => b,
            None => {
                let b = self.alloc.allocate_data_block(&mut self.image)?;
                inode.direct[0] = b;
                inode.blocks = 1;
                b
            }
        };

        let start = offset as usize;
        self.image.block_mut(b)?[start..start + data.len()].copy_from_slice(data);

        inode.size = inode.size.max(end as u32);
        inode.mtime = now_secs();
        self.image.store_inode(ino, &inode)?;
        Ok(data.len())
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        let ino = self.resolve(path)?;
        self.truncate_at(ino, size)
    }

    /// Los bytes más allá del tamaño quedan en cero, así que crecer solo
    /// ajusta `size`.
    pub fn truncate_at(&mut self, ino: u32, size: u64) -> Result<()> {
        let (mut inode, kind) = self.live_inode(ino)?;
        match kind {
            InodeKind::RegularFile => {}
            InodeKind::Directory | InodeKind::Free => return Err(FsError::IsADirectory),
        }
        if size > self.image.block_size() as u64 {
            return Err(FsError::OutOfRange(format!(
                "tamaño {} excede el bloque de {} bytes",
                size,
                self.image.block_size()
            )));
        }
        let size = size as u32;

        match inode.data_block() {
            Some(b) if size < inode.size => {
                let old = (inode.size as usize).min(self.image.block_size() as usize);
                self.image.block_mut(b)?[size as usize..old].fill(0);
            }
            Some(_) => {}
            None if size > 0 => {
                let b = self.alloc.allocate_data_block(&mut self.image)?;
                inode.direct[0] = b;
                inode.blocks = 1;
            }
            None => {}
        }

        inode.size = size;
        inode.mtime = now_secs();
        self.image.store_inode(ino, &inode)
    }
}

// -----------------------------------------------------------------------------
// Cambios al espacio de nombres
// -----------------------------------------------------------------------------

impl Minifs {
    /// Crea `path` y devuelve su inodo. Si algo falla después de asignar el
    /// inodo, se libera antes de devolver el error.
    pub fn create(&mut self, path: &str, kind: InodeKind, mode: u32) -> Result<u32> {
        let name = match parse_path(path)? {
            PathTarget::Root => return Err(FsError::AlreadyExists),
            PathTarget::Entry(name) => name,
        };
        if kind == InodeKind::Free {
            return Err(FsError::Unsupported("crear un inodo libre"));
        }
        validate_name(name)?;
        match self.lookup(name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let now = now_secs();
        let slot = self.alloc.allocate_entry_slot(&self.image)?;
        let init = InodeDisk::new(kind, (mode & PERM_MASK as u32) as u16, now);
        let ino = self.alloc.allocate_inode(&mut self.image, &init)?;

        if let Err(e) = dir::insert_entry(&mut self.image, slot, ino, name, now) {
            self.alloc.free_inode(&mut self.image, ino)?;
            return Err(e);
        }

        debug!("{:?} creado: inodo {}, ranura {}, {:?}", name, ino, slot, kind);
        Ok(ino)
    }

    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<u32> {
        self.create(path, InodeKind::Directory, mode)
    }

    fn entry(&self, path: &str) -> Result<(usize, u32, InodeKind, InodeDisk)> {
        let name = match parse_path(path)? {
            PathTarget::Root => return Err(FsError::Unsupported("operación sobre la raíz")),
            PathTarget::Entry(name) => name,
        };
        let (slot, ino) = dir::find_slot(&self.image, name)?;
        let (inode, kind) = self.live_inode(ino)?;
        Ok((slot, ino, kind, inode))
    }

    fn remove(&mut self, slot: usize, ino: u32) -> Result<()> {
        dir::remove_entry(&mut self.image, slot, now_secs())?;
        self.alloc.free_inode(&mut self.image, ino)
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        if parse_path(path)? == PathTarget::Root {
            return Err(FsError::IsADirectory);
        }
        let (slot, ino, kind, _) = self.entry(path)?;
        match kind {
            InodeKind::RegularFile => {}
            InodeKind::Directory | InodeKind::Free => return Err(FsError::IsADirectory),
        }
        self.remove(slot, ino)?;
        debug!("{:?} eliminado (inodo {})", path, ino);
        Ok(())
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (slot, ino, kind, inode) = self.entry(path)?;
        match kind {
            InodeKind::Directory => {}
            InodeKind::RegularFile | InodeKind::Free => return Err(FsError::NotADirectory),
        }
        if inode.size != 0 {
            return Err(FsError::NotEmpty);
        }
        self.remove(slot, ino)?;
        debug!("directorio {:?} eliminado (inodo {})", path, ino);
        Ok(())
    }

    /// Renombra dentro de la raíz. Un destino existente se reemplaza si es
    /// compatible: archivo por archivo, o directorio vacío por directorio.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (from_slot, _, from_kind, _) = self.entry(from)?;
        let to_name = match parse_path(to)? {
            PathTarget::Root => return Err(FsError::Unsupported("renombrar sobre la raíz")),
            PathTarget::Entry(name) => name,
        };
        validate_name(to_name)?;

        let from_name = match parse_path(from)? {
            PathTarget::Entry(name) => name,
            PathTarget::Root => return Err(FsError::Unsupported("renombrar la raíz")),
        };
        if from_name == to_name {
            return Ok(());
        }

        let now = now_secs();
        match self.entry(to) {
            Ok((to_slot, to_ino, to_kind, to_inode)) => {
                match (from_kind, to_kind) {
                    (InodeKind::RegularFile, InodeKind::RegularFile) => {}
                    (InodeKind::Directory, InodeKind::Directory) if to_inode.size != 0 => {
                        return Err(FsError::NotEmpty)
                    }
                    (InodeKind::Directory, InodeKind::Directory) => {}
                    (InodeKind::RegularFile, _) => return Err(FsError::IsADirectory),
                    (InodeKind::Directory, _) | (InodeKind::Free, _) => {
                        return Err(FsError::NotADirectory)
                    }
                }
                self.remove(to_slot, to_ino)?;
                // quitar una entrada puede mover la última a otra ranura
                let (slot, _) = dir::find_slot(&self.image, from_name)?;
                dir::rename_entry(&mut self.image, slot, to_name, now)?;
            }
            Err(FsError::NotFound) => {
                dir::rename_entry(&mut self.image, from_slot, to_name, now)?;
            }
            Err(e) => return Err(e),
        }

        debug!("{:?} renombrado a {:?}", from_name, to_name);
        Ok(())
    }
}
