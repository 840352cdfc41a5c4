// src/dir.rs
//
// Resolución de nombres sobre el único directorio (la raíz). Las entradas
// ocupadas forman siempre un prefijo denso del bloque: `0 .. root.size / 32`.

use crate::error::{FsError, Result};
use crate::image::Image;
use crate::layout::{entries_per_block, DirEntryDisk, InodeKind, DIR_ENTRY_LEN, ROOT_INODE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u32,
    pub name: String,
    pub kind: InodeKind,
}

// --------- Lectura ---------

/// Bloque de datos del directorio raíz (puntero directo 0 del inodo 0).
pub fn root_block(image: &Image) -> Result<u32> {
    let root = image.load_inode(ROOT_INODE)?;
    if root.kind() != Some(InodeKind::Directory) {
        return Err(FsError::corrupt(format!(
            "el inodo raíz no es un directorio (modo {:#06x})",
            root.mode
        )));
    }
    let b = root
        .data_block()
        .ok_or_else(|| FsError::corrupt("el inodo raíz no tiene bloque de directorio"))?;
    if b < image.first_data_block() || b >= image.total_blocks() {
        return Err(FsError::corrupt(format!(
            "bloque de directorio {} fuera de la zona de datos",
            b
        )));
    }
    Ok(b)
}

/// Entradas ocupadas según `root.size`.
pub fn occupied_count(image: &Image) -> Result<usize> {
    let root = image.load_inode(ROOT_INODE)?;
    let size = root.size as usize;
    if size % DIR_ENTRY_LEN != 0 || size / DIR_ENTRY_LEN > entries_per_block(image.block_size()) {
        return Err(FsError::corrupt(format!(
            "tamaño del directorio raíz inválido: {}",
            size
        )));
    }
    Ok(size / DIR_ENTRY_LEN)
}

fn entry_at(image: &Image, block: u32, slot: usize) -> Result<DirEntryDisk> {
    let off = slot * DIR_ENTRY_LEN;
    let data = image.block(block)?;
    Ok(DirEntryDisk::decode(&data[off..off + DIR_ENTRY_LEN]))
}

fn put_entry(image: &mut Image, block: u32, slot: usize, entry: &DirEntryDisk) -> Result<()> {
    let off = slot * DIR_ENTRY_LEN;
    let data = image.block_mut(block)?;
    entry.encode(&mut data[off..off + DIR_ENTRY_LEN]);
    Ok(())
}

/// Valida que la entrada apunte a un inodo asignado y devuelve su tipo.
fn target_kind(image: &Image, slot: usize, entry: &DirEntryDisk) -> Result<InodeKind> {
    if entry.inode == ROOT_INODE || entry.inode >= image.total_inodes() {
        return Err(FsError::corrupt(format!(
            "la entrada {} ({:?}) apunta al inodo {} (total_inodes = {})",
            slot,
            entry.name(),
            entry.inode,
            image.total_inodes()
        )));
    }
    let inode = image.load_inode(entry.inode)?;
    match inode.kind() {
        Some(InodeKind::Free) | None => Err(FsError::corrupt(format!(
            "la entrada {} ({:?}) apunta al inodo {} que no está asignado",
            slot,
            entry.name(),
            entry.inode
        ))),
        Some(kind) => Ok(kind),
    }
}

/// Busca `name` y devuelve `(ranura, inodo)`.
pub fn find_slot(image: &Image, name: &str) -> Result<(usize, u32)> {
    let block = root_block(image)?;
    for slot in 0..occupied_count(image)? {
        let entry = entry_at(image, block, slot)?;
        if entry.is_free() || !entry.name_matches(name) {
            continue;
        }
        target_kind(image, slot, &entry)?;
        return Ok((slot, entry.inode));
    }
    Err(FsError::NotFound)
}

pub fn lookup(image: &Image, name: &str) -> Result<u32> {
    find_slot(image, name).map(|(_, ino)| ino)
}

/// Entradas ocupadas en orden de ranura, materializadas al momento de llamar.
pub fn list_directory(image: &Image) -> Result<Vec<DirEntry>> {
    let block = root_block(image)?;
    let count = occupied_count(image)?;
    let mut entries = Vec::with_capacity(count);
    for slot in 0..count {
        let entry = entry_at(image, block, slot)?;
        if entry.is_free() {
            continue;
        }
        let kind = target_kind(image, slot, &entry)?;
        entries.push(DirEntry {
            ino: entry.inode,
            name: entry.name(),
            kind,
        });
    }
    Ok(entries)
}

/// Verifica que el prefijo `0..count` esté completo y el resto libre.
pub fn check_dense(image: &Image) -> Result<()> {
    let block = root_block(image)?;
    let count = occupied_count(image)?;
    for slot in 0..entries_per_block(image.block_size()) {
        let entry = entry_at(image, block, slot)?;
        if slot < count && entry.is_free() {
            return Err(FsError::corrupt(format!(
                "ranura {} libre dentro del prefijo ocupado (0..{})",
                slot, count
            )));
        }
        if slot >= count && !entry.is_free() {
            return Err(FsError::corrupt(format!(
                "ranura {} ocupada fuera del prefijo ocupado (0..{})",
                slot, count
            )));
        }
        if slot < count {
            target_kind(image, slot, &entry)?;
        }
    }
    Ok(())
}

// --------- Escritura ---------

fn set_root_size(image: &mut Image, count: usize, now: u32) -> Result<()> {
    let mut root = image.load_inode(ROOT_INODE)?;
    root.size = (count * DIR_ENTRY_LEN) as u32;
    root.mtime = now;
    image.store_inode(ROOT_INODE, &root)
}

/// Escribe la entrada en `slot` y crece el conteo ocupado.
pub fn insert_entry(image: &mut Image, slot: usize, ino: u32, name: &str, now: u32) -> Result<()> {
    let count = occupied_count(image)?;
    if slot != count {
        return Err(FsError::corrupt(format!(
            "ranura libre {} no coincide con el conteo ocupado {}",
            slot, count
        )));
    }
    let block = root_block(image)?;
    put_entry(image, block, slot, &DirEntryDisk::new(ino, name))?;
    set_root_size(image, count + 1, now)
}

/// Quita la entrada de `slot`; la última entrada ocupada pasa a su lugar.
pub fn remove_entry(image: &mut Image, slot: usize, now: u32) -> Result<()> {
    let count = occupied_count(image)?;
    if slot >= count {
        return Err(FsError::OutOfRange(format!(
            "ranura {} (ocupadas = {})",
            slot, count
        )));
    }
    let block = root_block(image)?;
    let last = count - 1;
    if slot != last {
        let moved = entry_at(image, block, last)?;
        put_entry(image, block, slot, &moved)?;
    }
    put_entry(image, block, last, &DirEntryDisk::EMPTY)?;
    set_root_size(image, last, now)
}

pub fn rename_entry(image: &mut Image, slot: usize, new_name: &str, now: u32) -> Result<()> {
    let block = root_block(image)?;
    let entry = entry_at(image, block, slot)?;
    put_entry(image, block, slot, &DirEntryDisk::new(entry.inode, new_name))?;
    let mut root = image.load_inode(ROOT_INODE)?;
    root.mtime = now;
    image.store_inode(ROOT_INODE, &root)
}
