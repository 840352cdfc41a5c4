/* El archivo principal del fsck: validación del superblock, de los inodos,
de los bloques, del directorio raíz, de los contadores libres y detección de
inodos huérfanos. `repair` solo corrige estado derivado. */

use std::collections::{HashMap, HashSet};

use crate::alloc::Allocator;
use crate::dir;
use crate::error::Result;
use crate::image::Image;
use crate::layout::{
    entries_per_block, DirEntryDisk, InodeDisk, InodeKind, SuperblockDisk, BLOCK_SIZE,
    DIR_ENTRY_LEN, INODE_RECORD_LEN, INODE_SIZE, INODE_TABLE_BLOCK, ROOT_INODE,
};

use super::{fsck_backend::FsckBackend, fsck_types::*};

/// Devuelve el superblock solo si la geometría permite seguir revisando.
fn check_superblock<B: FsckBackend>(backend: &B, report: &mut FsckReport) -> Option<SuperblockDisk> {
    let len = backend.image_len();
    let Some(sb) = backend.load_superblock().filter(|_| len >= BLOCK_SIZE as usize) else {
        report.errors.push(format!("Superblock: la imagen ({len} bytes) es más chica que un bloque"));
        report.blocks_ok = false;
        return None;
    };

    // 1. Tamaño de bloque
    if sb.block_size != BLOCK_SIZE {
        report.errors.push(format!(
            "Superblock: block_size = {}, se espera {}",
            sb.block_size, BLOCK_SIZE
        ));
        report.blocks_ok = false;
        return None;
    }

    // 2. Tamaño de la imagen contra total_blocks
    let expected = sb.total_blocks as u64 * sb.block_size as u64;
    if expected != len as u64 {
        report.errors.push(format!(
            "Superblock: total_blocks = {} implica {} bytes, pero la imagen tiene {}",
            sb.total_blocks, expected, len
        ));
        report.blocks_ok = false;
    }

    // 3. Región de la tabla de inodos
    if sb.first_data_block <= INODE_TABLE_BLOCK || sb.first_data_block > sb.total_blocks {
        report.errors.push(format!(
            "Superblock: first_data_block ({}) fuera de rango",
            sb.first_data_block
        ));
        report.blocks_ok = false;
        return None;
    }

    if sb.total_inodes == 0 {
        report.errors.push("Superblock: total_inodes no puede ser 0".into());
        report.inodes_ok = false;
        return None;
    }

    let table = sb.total_inodes as u64 * INODE_RECORD_LEN as u64;
    let region = sb.inode_table_blocks() as u64 * sb.block_size as u64;
    if table > region {
        report.errors.push(format!(
            "Superblock: {} inodos ({} bytes) no caben en {} bloques de tabla",
            sb.total_inodes,
            table,
            sb.inode_table_blocks()
        ));
        report.inodes_ok = false;
    }

    // 4. Campo informativo, pero inmutable
    if sb.inode_size != INODE_SIZE {
        report.errors.push(format!(
            "Superblock: inode_size = {}, se espera {}",
            sb.inode_size, INODE_SIZE
        ));
    }

    Some(sb)
}

fn check_inodes_basic(sb: &SuperblockDisk, inodes: &[InodeDisk], report: &mut FsckReport) {
    for (idx, inode) in inodes.iter().enumerate() {
        let kind = match inode.kind() {
            Some(InodeKind::Free) => continue,
            Some(kind) => kind,
            None => {
                report.errors.push(format!(
                    "Inodo {}: modo {:#06x} desconocido",
                    idx, inode.mode
                ));
                report.inodes_ok = false;
                continue;
            }
        };

        // 1. Puntero directo principal
        if let Some(b) = inode.data_block() {
            if b < sb.first_data_block || b >= sb.total_blocks {
                report.errors.push(format!(
                    "Inodo {}: bloque directo fuera de la zona de datos ({})",
                    idx, b
                ));
                report.inodes_ok = false;
            }
        }

        // 2. Archivos de un solo bloque
        if inode.direct[1..].iter().any(|&b| b != 0) {
            report.errors.push(format!("Inodo {}: usa punteros directos adicionales", idx));
            report.inodes_ok = false;
        }
        if inode.indirect != 0 {
            report.errors.push(format!("Inodo {}: indirect distinto de cero ({})", idx, inode.indirect));
            report.inodes_ok = false;
        }

        // 3. Tamaño
        if inode.size > sb.block_size {
            report.errors.push(format!(
                "Inodo {}: tamaño {} mayor que un bloque",
                idx, inode.size
            ));
            report.inodes_ok = false;
        }
        if kind == InodeKind::RegularFile && inode.size > 0 && inode.data_block().is_none() {
            report.errors.push(format!(
                "Inodo {}: tamaño {} sin bloque de datos",
                idx, inode.size
            ));
            report.inodes_ok = false;
        }

        // 4. Enlaces
        if inode.links_count == 0 {
            report.errors.push(format!("Inodo {}: asignado con links_count = 0", idx));
            report.inodes_ok = false;
        }
    }

    if inodes.len() < sb.total_inodes as usize {
        report.errors.push(format!(
            "Tabla de inodos truncada: {} de {} inodos legibles",
            inodes.len(),
            sb.total_inodes
        ));
        report.inodes_ok = false;
    }
}

fn check_blocks_global(inodes: &[InodeDisk], report: &mut FsckReport) {
    let mut seen: HashMap<u32, usize> = HashMap::new();

    for (idx, inode) in inodes.iter().enumerate() {
        if inode.is_free() {
            continue;
        }
        let Some(b) = inode.data_block() else {
            continue;
        };
        if let Some(first) = seen.insert(b, idx) {
            report.errors.push(format!(
                "Inodo {}: bloque {} ya usado por el inodo {}",
                idx, b, first
            ));
            report.blocks_ok = false;
        }
    }
}

/// Revisa la raíz y sus entradas; devuelve los inodos referenciados.
fn check_dirs<B: FsckBackend>(
    backend: &B,
    sb: &SuperblockDisk,
    inodes: &[InodeDisk],
    report: &mut FsckReport,
) -> Vec<u32> {
    let Some(root) = inodes.get(ROOT_INODE as usize) else {
        report.errors.push("Root inode fuera de la tabla".into());
        report.dirs_ok = false;
        return Vec::new();
    };

    if root.kind() != Some(InodeKind::Directory) {
        report.errors.push("Root inode no es un directorio".into());
        report.dirs_ok = false;
        return Vec::new();
    }
    if root.data_block().is_none() {
        report.errors.push("Root inode no tiene bloque de directorio".into());
        report.dirs_ok = false;
        return Vec::new();
    }

    let max = entries_per_block(sb.block_size);
    let size = root.size as usize;
    if size % DIR_ENTRY_LEN != 0 || size / DIR_ENTRY_LEN > max {
        report.errors.push(format!(
            "Root: tamaño {} no es un número válido de entradas",
            size
        ));
        report.dirs_ok = false;
    }
    let count = (size / DIR_ENTRY_LEN).min(max);

    let mut names = HashSet::new();
    let mut referenced = Vec::new();

    for entry in backend.read_root_dir() {
        // Densidad: prefijo ocupado, resto libre
        if entry.is_free() {
            if entry.slot < count {
                report.errors.push(format!(
                    "Root: ranura {} libre dentro del prefijo ocupado (0..{})",
                    entry.slot, count
                ));
                report.dirs_ok = false;
            }
            continue;
        }
        if entry.slot >= count {
            report.errors.push(format!(
                "Root: ranura {} ({:?}) ocupada fuera del prefijo (0..{})",
                entry.slot, entry.name, count
            ));
            report.dirs_ok = false;
        }

        // Nombre vacío o sin terminar
        if entry.name.is_empty() {
            report.errors.push(format!("Root: dirent {} con nombre vacío", entry.slot));
            report.dirs_ok = false;
        }
        if !entry.terminated {
            report.errors.push(format!("Root: dirent {} sin NUL final", entry.slot));
            report.dirs_ok = false;
        }
        if !names.insert(entry.name.clone()) {
            report.errors.push(format!("Root: nombre repetido {:?}", entry.name));
            report.dirs_ok = false;
        }

        // Inodo fuera de rango
        if entry.inode == ROOT_INODE || entry.inode as usize >= inodes.len() {
            report.errors.push(format!(
                "Root: dirent '{}' apunta a inodo inexistente ({})",
                entry.name, entry.inode
            ));
            report.dirs_ok = false;
            continue;
        }

        if inodes[entry.inode as usize].is_free() {
            report.errors.push(format!(
                "Root: dirent '{}' apunta al inodo libre {}",
                entry.name, entry.inode
            ));
            report.dirs_ok = false;
        }
        referenced.push(entry.inode);
    }

    referenced
}

fn check_counters(sb: &SuperblockDisk, inodes: &[InodeDisk], report: &mut FsckReport) {
    let mut used = HashSet::new();
    for inode in inodes.iter().filter(|i| !i.is_free()) {
        if let Some(b) = inode.data_block() {
            if b >= sb.first_data_block && b < sb.total_blocks {
                used.insert(b);
            }
        }
    }
    let free_blocks = sb.total_blocks.saturating_sub(sb.first_data_block) - used.len() as u32;
    let free_inodes = inodes.iter().filter(|i| i.is_free()).count() as u32;

    if sb.free_blocks != free_blocks {
        report.errors.push(format!(
            "Superblock: free_blocks = {}, pero hay {} bloques libres",
            sb.free_blocks, free_blocks
        ));
        report.blocks_ok = false;
    }
    if sb.free_inodes != free_inodes {
        report.errors.push(format!(
            "Superblock: free_inodes = {}, pero hay {} inodos libres",
            sb.free_inodes, free_inodes
        ));
        report.inodes_ok = false;
    }
}

fn check_orphan_inodes(inodes: &[InodeDisk], referenced: &[u32], report: &mut FsckReport) {
    let mut refs = vec![0usize; inodes.len()];
    for &ino in referenced {
        refs[ino as usize] += 1;
    }

    for (ino, inode) in inodes.iter().enumerate() {
        if ino == ROOT_INODE as usize || inode.is_free() || inode.kind().is_none() {
            continue;
        }
        match refs[ino] {
            0 => {
                report.errors.push(format!("Inodo {} huérfano", ino));
                report.inodes_ok = false;
            }
            1 => {}
            n => {
                report.errors.push(format!("Inodo {} referenciado {} veces", ino, n));
                report.inodes_ok = false;
            }
        }
    }
}

pub fn run_fsck<B: FsckBackend>(backend: &B) -> FsckReport {
    let mut report = FsckReport::new();

    // --- Paso 1: Validación del superblock ---
    let Some(sb) = check_superblock(backend, &mut report) else {
        return report;
    };
    let inodes = backend.load_all_inodes();

    // --- Paso 2: Validación básica de inodos ---
    check_inodes_basic(&sb, &inodes, &mut report);

    // --- Paso 3: Validación global de bloques ---
    check_blocks_global(&inodes, &mut report);

    // --- Paso 4: Validación del directorio raíz ---
    let referenced = check_dirs(backend, &sb, &inodes, &mut report);

    // --- Paso 5: Contadores libres ---
    check_counters(&sb, &inodes, &mut report);

    // --- Paso 6: Detección de inodos huérfanos ---
    check_orphan_inodes(&inodes, &referenced, &mut report);

    report
}

/// Compacta el directorio raíz y recalcula los contadores libres.
/// No toca nada más; devuelve la lista de cambios hechos.
pub fn repair(bytes: Vec<u8>) -> Result<(Vec<u8>, Vec<String>)> {
    let mut image = Image::from_bytes(bytes)?;
    let mut actions = Vec::new();

    let block = dir::root_block(&image)?;
    let max = entries_per_block(image.block_size());
    let entries: Vec<DirEntryDisk> = (0..max)
        .map(|slot| {
            let off = slot * DIR_ENTRY_LEN;
            image
                .block(block)
                .map(|data| DirEntryDisk::decode(&data[off..off + DIR_ENTRY_LEN]))
        })
        .collect::<Result<_>>()?;

    let occupied: Vec<DirEntryDisk> = entries.iter().filter(|e| !e.is_free()).copied().collect();
    let mut root = image.load_inode(ROOT_INODE)?;
    let dense_size = (occupied.len() * DIR_ENTRY_LEN) as u32;
    let already_dense = entries[..occupied.len()].iter().all(|e| !e.is_free());

    if !already_dense || root.size != dense_size {
        let data = image.block_mut(block)?;
        for (slot, entry) in occupied
            .iter()
            .chain(std::iter::repeat(&DirEntryDisk::EMPTY))
            .take(max)
            .enumerate()
        {
            let off = slot * DIR_ENTRY_LEN;
            entry.encode(&mut data[off..off + DIR_ENTRY_LEN]);
        }
        actions.push(format!(
            "directorio raíz compactado: {} entradas (tamaño {} -> {})",
            occupied.len(),
            root.size,
            dense_size
        ));
        root.size = dense_size;
        image.store_inode(ROOT_INODE, &root)?;
    }

    let alloc = Allocator::scan(&image)?;
    let before = image.superblock();
    if alloc.reconcile_counters(&mut image)? {
        let after = image.superblock();
        actions.push(format!(
            "contadores recalculados: free_blocks {} -> {}, free_inodes {} -> {}",
            before.free_blocks, after.free_blocks, before.free_inodes, after.free_inodes
        ));
    }

    Ok((image.into_bytes(), actions))
}
