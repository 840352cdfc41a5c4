//! Utilidades compartidas por las pruebas de integración

#![allow(dead_code)]

use minifs::layout::InodeDisk;
use minifs::mkfs::{format, FormatOptions, SeedFile};
use minifs::{Image, Minifs};

/// Imagen por omisión (128 bloques, 16 inodos) con hello.txt.
pub fn hello_fs() -> Minifs {
    let opts = FormatOptions {
        seed: vec![SeedFile::hello()],
        ..FormatOptions::default()
    };
    Minifs::from_bytes(format(&opts).unwrap()).unwrap()
}

pub fn empty_fs() -> Minifs {
    Minifs::from_bytes(format(&FormatOptions::default()).unwrap()).unwrap()
}

/// Modifica un inodo directamente en los bytes y vuelve a montar.
pub fn patch_inode(fs: Minifs, ino: u32, f: impl FnOnce(&mut InodeDisk)) -> Minifs {
    let mut image = Image::from_bytes(fs.into_bytes()).unwrap();
    let mut inode = image.load_inode(ino).unwrap();
    f(&mut inode);
    image.store_inode(ino, &inode).unwrap();
    Minifs::from_image(image).unwrap()
}

pub fn names(fs: &Minifs) -> Vec<String> {
    fs.list_directory("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}
