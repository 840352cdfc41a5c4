// src/mkfs.rs
//
// Creación de imágenes vacías (o con archivos sembrados). Lo usan
// `mkfs.minifs` y las pruebas.

use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::fs::{now_secs, validate_name};
use crate::image::Image;
use crate::layout::{
    entries_per_block, DirEntryDisk, InodeDisk, InodeKind, SuperblockDisk, BLOCK_SIZE,
    DEFAULT_FS_NAME, DEFAULT_TOTAL_BLOCKS, DEFAULT_TOTAL_INODES, DIR_ENTRY_LEN, FS_NAME_LEN,
    INODE_RECORD_LEN, INODE_SIZE, INODE_TABLE_BLOCK, ROOT_INODE,
};

pub const HELLO_NAME: &str = "hello.txt";
pub const HELLO_CONTENT: &[u8] = b"Hola MiniFS!\n";

/// Archivo regular que se escribe en la imagen al formatear.
#[derive(Debug, Clone)]
pub struct SeedFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl SeedFile {
    pub fn hello() -> Self {
        Self {
            name: HELLO_NAME.to_string(),
            content: HELLO_CONTENT.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub total_blocks: u32,
    pub total_inodes: u32,
    pub label: String,
    pub seed: Vec<SeedFile>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            total_blocks: DEFAULT_TOTAL_BLOCKS,
            total_inodes: DEFAULT_TOTAL_INODES,
            label: DEFAULT_FS_NAME.to_string(),
            seed: Vec::new(),
        }
    }
}

/// Layout calculado para una geometría.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsLayout {
    pub total_blocks: u32,
    pub total_inodes: u32,
    pub inode_table_blocks: u32,
    pub first_data_block: u32,
    pub root_block: u32,
}

/// Superblock en el bloque 0, bloques 1 y 2 reservados, tabla de inodos
/// desde el bloque 3 y, justo después, el bloque del directorio raíz.
pub fn build_layout(total_blocks: u32, total_inodes: u32) -> Result<FsLayout> {
    if total_inodes == 0 {
        return Err(anyhow!("se requiere al menos un inodo (la raíz)"));
    }

    let table_bytes = total_inodes as u64 * INODE_RECORD_LEN as u64;
    let inode_table_blocks = table_bytes.div_ceil(BLOCK_SIZE as u64).max(1);
    let first_data_block = INODE_TABLE_BLOCK as u64 + inode_table_blocks;

    if first_data_block >= total_blocks as u64 {
        return Err(anyhow!(
            "No hay espacio para bloques de datos: total_blocks={}, first_data_block={}",
            total_blocks,
            first_data_block
        ));
    }

    Ok(FsLayout {
        total_blocks,
        total_inodes,
        inode_table_blocks: inode_table_blocks as u32,
        first_data_block: first_data_block as u32,
        root_block: first_data_block as u32,
    })
}

fn check_seed(opts: &FormatOptions, layout: &FsLayout) -> Result<()> {
    let max_entries = entries_per_block(BLOCK_SIZE);
    if opts.seed.len() > max_entries {
        return Err(anyhow!(
            "{} archivos no caben en el directorio raíz (máximo {})",
            opts.seed.len(),
            max_entries
        ));
    }
    if opts.seed.len() as u64 >= layout.total_inodes as u64 {
        return Err(anyhow!(
            "{} archivos necesitan más de {} inodos",
            opts.seed.len(),
            layout.total_inodes
        ));
    }

    let with_data = opts.seed.iter().filter(|s| !s.content.is_empty()).count() as u64;
    let data_blocks = (layout.total_blocks - layout.root_block - 1) as u64;
    if with_data > data_blocks {
        return Err(anyhow!(
            "{} archivos con contenido pero solo quedan {} bloques de datos",
            with_data,
            data_blocks
        ));
    }

    let mut seen = HashSet::new();
    for seed in &opts.seed {
        validate_name(&seed.name)?;
        if !seen.insert(seed.name.as_str()) {
            return Err(anyhow!("nombre repetido: {:?}", seed.name));
        }
        if seed.content.len() > BLOCK_SIZE as usize {
            return Err(anyhow!(
                "{:?} tiene {} bytes; los archivos son de un solo bloque ({} bytes)",
                seed.name,
                seed.content.len(),
                BLOCK_SIZE
            ));
        }
    }
    Ok(())
}

/// Produce una imagen que ya cumple todos los invariantes: contadores
/// exactos, raíz con bloque de directorio y archivos sembrados completos.
pub fn format(opts: &FormatOptions) -> Result<Vec<u8>> {
    if opts.label.len() >= FS_NAME_LEN {
        return Err(anyhow!(
            "la etiqueta {:?} excede {} bytes",
            opts.label,
            FS_NAME_LEN - 1
        ));
    }
    let layout = build_layout(opts.total_blocks, opts.total_inodes)?;
    check_seed(opts, &layout)?;

    let now = now_secs();
    let used_data = 1 + opts.seed.iter().filter(|s| !s.content.is_empty()).count() as u32;

    let mut sb = SuperblockDisk {
        total_blocks: layout.total_blocks,
        total_inodes: layout.total_inodes,
        block_size: BLOCK_SIZE,
        inode_size: INODE_SIZE,
        free_blocks: layout.total_blocks - layout.first_data_block - used_data,
        free_inodes: layout.total_inodes - 1 - opts.seed.len() as u32,
        first_data_block: layout.first_data_block,
        fs_name: [0; FS_NAME_LEN],
    };
    sb.set_label(&opts.label);

    let mut bytes = vec![0u8; layout.total_blocks as usize * BLOCK_SIZE as usize];
    sb.encode(&mut bytes);
    let mut image = Image::from_bytes(bytes)?;

    let mut root = InodeDisk::new(InodeKind::Directory, 0o755, now);
    root.direct[0] = layout.root_block;
    root.blocks = 1;
    root.size = (opts.seed.len() * DIR_ENTRY_LEN) as u32;
    image.store_inode(ROOT_INODE, &root)?;

    let mut next_block = layout.root_block + 1;
    for (slot, seed) in opts.seed.iter().enumerate() {
        let ino = slot as u32 + 1;
        let mut inode = InodeDisk::new(InodeKind::RegularFile, 0o644, now);
        inode.size = seed.content.len() as u32;

        if !seed.content.is_empty() {
            inode.direct[0] = next_block;
            inode.blocks = 1;
            image.block_mut(next_block)?[..seed.content.len()].copy_from_slice(&seed.content);
            next_block += 1;
        }
        image.store_inode(ino, &inode)?;

        let off = slot * DIR_ENTRY_LEN;
        DirEntryDisk::new(ino, &seed.name)
            .encode(&mut image.block_mut(layout.root_block)?[off..off + DIR_ENTRY_LEN]);
    }

    Ok(image.into_bytes())
}
