/* Estructuras que usa el fsck: la entrada de directorio tal como está en
disco (incluyendo ranuras libres) y el reporte donde se acumulan errores. */

#[derive(Debug, Clone)]
pub struct Dirent {
    pub slot: usize,
    pub inode: u32,
    pub name: String,
    /// `false` si el campo de nombre ocupa los 28 bytes sin NUL.
    pub terminated: bool,
}

impl Dirent {
    pub fn is_free(&self) -> bool {
        self.inode == 0
    }
}

#[derive(Debug)]
pub struct FsckReport {
    pub blocks_ok: bool,
    pub inodes_ok: bool,
    pub dirs_ok: bool,
    pub errors: Vec<String>,
}

impl FsckReport {
    pub fn new() -> Self {
        Self {
            blocks_ok: true,
            inodes_ok: true,
            dirs_ok: true,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for FsckReport {
    fn default() -> Self {
        Self::new()
    }
}
