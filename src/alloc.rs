// src/alloc.rs
//
// Asignación de inodos, ranuras de directorio y bloques de datos.
// La ocupación de bloques se reconstruye al montar a partir de los punteros
// directos de los inodos asignados; no hay bitmap en disco.

use log::{debug, warn};

use crate::dir;
use crate::error::{FsError, Result};
use crate::image::Image;
use crate::layout::{entries_per_block, DirEntryDisk, InodeDisk, InodeKind, DIR_ENTRY_LEN, ROOT_INODE};

pub struct Allocator {
    /// `true` = bloque en uso. Incluye la metadata bajo `first_data_block`.
    used_blocks: Vec<bool>,
}

impl Allocator {
    /// Recorre la tabla de inodos y marca cada bloque referenciado.
    /// Punteros fuera de rango o compartidos son una falla de integridad.
    pub fn scan(image: &Image) -> Result<Self> {
        let total = image.total_blocks();
        let first = image.first_data_block();
        let mut used_blocks = vec![false; total as usize];
        used_blocks[..first as usize].fill(true);

        for ino in 0..image.total_inodes() {
            let inode = image.load_inode(ino)?;
            match inode.kind() {
                None => {
                    return Err(FsError::corrupt(format!(
                        "inodo {}: modo {:#06x} desconocido",
                        ino, inode.mode
                    )))
                }
                Some(InodeKind::Free) => continue,
                Some(InodeKind::RegularFile) | Some(InodeKind::Directory) => {}
            }

            let Some(b) = inode.data_block() else {
                continue;
            };
            if b < first || b >= total {
                return Err(FsError::corrupt(format!(
                    "inodo {} apunta al bloque {} fuera de la zona de datos [{}, {})",
                    ino, b, first, total
                )));
            }
            if used_blocks[b as usize] {
                return Err(FsError::corrupt(format!(
                    "el bloque {} está referenciado por más de un inodo (último: {})",
                    b, ino
                )));
            }
            used_blocks[b as usize] = true;
        }

        Ok(Self { used_blocks })
    }

    pub fn free_blocks(&self) -> u32 {
        self.used_blocks.iter().filter(|used| !**used).count() as u32
    }

    #[cfg(test)]
    fn is_block_used(&self, b: u32) -> bool {
        self.used_blocks.get(b as usize).copied().unwrap_or(true)
    }

    pub fn count_free_inodes(image: &Image) -> Result<u32> {
        let mut free = 0;
        for ino in 0..image.total_inodes() {
            if image.load_inode(ino)?.is_free() {
                free += 1;
            }
        }
        Ok(free)
    }

    /// Reescribe los contadores del superblock si no coinciden con la
    /// ocupación real. Devuelve `true` si hubo que corregirlos.
    pub fn reconcile_counters(&self, image: &mut Image) -> Result<bool> {
        let free_blocks = self.free_blocks();
        let free_inodes = Self::count_free_inodes(image)?;
        let mut sb = image.superblock();

        if sb.free_blocks == free_blocks && sb.free_inodes == free_inodes {
            return Ok(false);
        }

        warn!(
            "contadores del superblock desactualizados: free_blocks {} -> {}, free_inodes {} -> {}",
            sb.free_blocks, free_blocks, sb.free_inodes, free_inodes
        );
        sb.free_blocks = free_blocks;
        sb.free_inodes = free_inodes;
        image.store_superblock(&sb);
        Ok(true)
    }

    // -------------------- Inodos --------------------

    /// Primer inodo libre (saltando el 0), inicializado con `init`.
    pub fn allocate_inode(&mut self, image: &mut Image, init: &InodeDisk) -> Result<u32> {
        let mut found = None;
        for ino in (ROOT_INODE + 1)..image.total_inodes() {
            if image.load_inode(ino)?.is_free() {
                found = Some(ino);
                break;
            }
        }
        let ino = found.ok_or(FsError::NoSpace)?;

        image.store_inode(ino, init)?;
        let mut sb = image.superblock();
        sb.free_inodes = sb.free_inodes.saturating_sub(1);
        image.store_superblock(&sb);

        debug!("inodo {} asignado", ino);
        Ok(ino)
    }

    /// Devuelve el inodo (y su bloque, si tiene) al conjunto libre.
    pub fn free_inode(&mut self, image: &mut Image, ino: u32) -> Result<()> {
        if ino == ROOT_INODE {
            return Err(FsError::Unsupported("liberar el inodo raíz"));
        }

        let mut inode = image.load_inode(ino)?;
        if inode.is_free() {
            return Ok(());
        }

        if let Some(b) = inode.data_block() {
            self.free_data_block(image, b)?;
        }

        inode.mode = 0;
        inode.size = 0;
        inode.links_count = 0;
        inode.blocks = 0;
        inode.direct[0] = 0;
        image.store_inode(ino, &inode)?;

        let mut sb = image.superblock();
        sb.free_inodes += 1;
        image.store_superblock(&sb);

        debug!("inodo {} liberado", ino);
        Ok(())
    }

    // -------------------- Ranuras de directorio --------------------

    /// Primera ranura libre del bloque del directorio raíz. No modifica nada.
    pub fn allocate_entry_slot(&self, image: &Image) -> Result<usize> {
        let block = image.block(dir::root_block(image)?)?;
        let max = entries_per_block(image.block_size());

        (0..max)
            .find(|&slot| {
                let off = slot * DIR_ENTRY_LEN;
                DirEntryDisk::decode(&block[off..off + DIR_ENTRY_LEN]).is_free()
            })
            .ok_or(FsError::NoSpace)
    }

    // -------------------- Bloques de datos --------------------

    /// Primer bloque libre desde `first_data_block`; se entrega en ceros.
    pub fn allocate_data_block(&mut self, image: &mut Image) -> Result<u32> {
        let first = image.first_data_block() as usize;
        let b = self.used_blocks[first..]
            .iter()
            .position(|used| !*used)
            .map(|pos| (first + pos) as u32)
            .ok_or(FsError::NoSpace)?;

        image.block_mut(b)?.fill(0);
        self.used_blocks[b as usize] = true;

        let mut sb = image.superblock();
        sb.free_blocks = sb.free_blocks.saturating_sub(1);
        image.store_superblock(&sb);

        debug!("bloque {} asignado", b);
        Ok(b)
    }

    pub fn free_data_block(&mut self, image: &mut Image, b: u32) -> Result<()> {
        if b < image.first_data_block() || b >= image.total_blocks() {
            return Err(FsError::OutOfRange(format!("bloque de datos {}", b)));
        }
        if !self.used_blocks[b as usize] {
            return Ok(());
        }
        self.used_blocks[b as usize] = false;

        let mut sb = image.superblock();
        sb.free_blocks += 1;
        image.store_superblock(&sb);
        Ok(())
    }
}
