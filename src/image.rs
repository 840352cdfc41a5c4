// src/image.rs
//
// Acceso a la imagen en memoria. Es el único lugar que calcula offsets
// crudos; todo lo demás pide bloques o inodos por índice.

use std::ops::Range;

use crate::error::{FsError, Result};
use crate::layout::{
    InodeDisk, SuperblockDisk, BLOCK_SIZE, INODE_RECORD_LEN, INODE_TABLE_BLOCK, SUPERBLOCK_BLOCK,
    SUPERBLOCK_LEN,
};

pub struct Image {
    bytes: Vec<u8>,
    total_blocks: u32,
    total_inodes: u32,
    block_size: u32,
    first_data_block: u32,
}

impl Image {
    /// Toma posesión del buffer y valida la geometría del superblock.
    /// Los campos de geometría quedan fijos desde aquí.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < BLOCK_SIZE as usize {
            return Err(FsError::corrupt(format!(
                "la imagen ({} bytes) es más chica que un bloque",
                bytes.len()
            )));
        }

        let sb = SuperblockDisk::decode(&bytes[..SUPERBLOCK_LEN]);

        if sb.block_size != BLOCK_SIZE {
            return Err(FsError::corrupt(format!(
                "tamaño de bloque no soportado (esperado = {}, leído = {})",
                BLOCK_SIZE, sb.block_size
            )));
        }

        let expected_len = sb.total_blocks as u64 * sb.block_size as u64;
        if expected_len != bytes.len() as u64 {
            return Err(FsError::corrupt(format!(
                "total_blocks = {} implica {} bytes, pero la imagen tiene {}",
                sb.total_blocks,
                expected_len,
                bytes.len()
            )));
        }

        if sb.first_data_block <= INODE_TABLE_BLOCK || sb.first_data_block > sb.total_blocks {
            return Err(FsError::corrupt(format!(
                "first_data_block = {} fuera de ({}, {}]",
                sb.first_data_block, INODE_TABLE_BLOCK, sb.total_blocks
            )));
        }

        if sb.total_inodes == 0 {
            return Err(FsError::corrupt("total_inodes no puede ser 0"));
        }

        let table_bytes = sb.total_inodes as u64 * INODE_RECORD_LEN as u64;
        let region_bytes = sb.inode_table_blocks() as u64 * sb.block_size as u64;
        if table_bytes > region_bytes {
            return Err(FsError::corrupt(format!(
                "la tabla de inodos ({} bytes) no cabe en su región ({} bytes)",
                table_bytes, region_bytes
            )));
        }

        Ok(Self {
            bytes,
            total_blocks: sb.total_blocks,
            total_inodes: sb.total_inodes,
            block_size: sb.block_size,
            first_data_block: sb.first_data_block,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    pub fn total_inodes(&self) -> u32 {
        self.total_inodes
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn first_data_block(&self) -> u32 {
        self.first_data_block
    }

    fn block_range(&self, b: u32) -> Result<Range<usize>> {
        if b >= self.total_blocks {
            return Err(FsError::OutOfRange(format!(
                "bloque {} (total_blocks = {})",
                b, self.total_blocks
            )));
        }
        let start = b as usize * self.block_size as usize;
        Ok(start..start + self.block_size as usize)
    }

    fn inode_range(&self, i: u32) -> Result<Range<usize>> {
        if i >= self.total_inodes {
            return Err(FsError::OutOfRange(format!(
                "inodo {} (total_inodes = {})",
                i, self.total_inodes
            )));
        }
        let start = INODE_TABLE_BLOCK as usize * self.block_size as usize
            + i as usize * INODE_RECORD_LEN;
        Ok(start..start + INODE_RECORD_LEN)
    }

    /// Vista de exactamente `block_size` bytes.
    pub fn block(&self, b: u32) -> Result<&[u8]> {
        let range = self.block_range(b)?;
        Ok(&self.bytes[range])
    }

    pub fn block_mut(&mut self, b: u32) -> Result<&mut [u8]> {
        let range = self.block_range(b)?;
        Ok(&mut self.bytes[range])
    }

    /// Vista del registro de inodo `i` dentro de la tabla.
    pub fn inode_slot(&self, i: u32) -> Result<&[u8]> {
        let range = self.inode_range(i)?;
        Ok(&self.bytes[range])
    }

    pub fn inode_slot_mut(&mut self, i: u32) -> Result<&mut [u8]> {
        let range = self.inode_range(i)?;
        Ok(&mut self.bytes[range])
    }

    // -------------------- Atajos tipados --------------------

    pub fn superblock(&self) -> SuperblockDisk {
        let start = SUPERBLOCK_BLOCK as usize * self.block_size as usize;
        SuperblockDisk::decode(&self.bytes[start..start + SUPERBLOCK_LEN])
    }

    pub fn store_superblock(&mut self, sb: &SuperblockDisk) {
        let start = SUPERBLOCK_BLOCK as usize * self.block_size as usize;
        sb.encode(&mut self.bytes[start..start + SUPERBLOCK_LEN]);
    }

    pub fn load_inode(&self, i: u32) -> Result<InodeDisk> {
        Ok(InodeDisk::decode(self.inode_slot(i)?))
    }

    pub fn store_inode(&mut self, i: u32, inode: &InodeDisk) -> Result<()> {
        inode.encode(self.inode_slot_mut(i)?);
        Ok(())
    }
}
