// src/bin/mount_minifs.rs
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use minifs::{Minifs, MinifsFilesystem, MountConfig};

/// Monta una imagen MiniFS con FUSE.
#[derive(Parser)]
#[command(name = "mount_minifs", version)]
struct Cli {
    /// Archivo de imagen creado con mkfs.minifs
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: PathBuf,

    /// Rechaza toda escritura (EROFS)
    #[arg(long)]
    read_only: bool,

    /// Permite el acceso a otros usuarios (requiere user_allow_other)
    #[arg(long)]
    allow_other: bool,

    /// No desmontar automáticamente al terminar el proceso
    #[arg(long)]
    no_auto_unmount: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // 1. Validar el punto de montaje
    if !cli.mountpoint.is_dir() {
        bail!(
            "El punto de montaje {:?} no existe o no es un directorio",
            cli.mountpoint
        );
    }

    // 2. Cargar y validar la imagen
    let fs = Minifs::open(&cli.image)
        .with_context(|| format!("Error al abrir la imagen {:?}", cli.image))?;

    let config = MountConfig {
        read_only: cli.read_only,
        allow_other: cli.allow_other,
        auto_unmount: !cli.no_auto_unmount,
    };

    println!(
        "mount_minifs: {:?} ({}) en {:?}{}",
        cli.image,
        fs.label(),
        cli.mountpoint,
        if config.read_only { " [solo lectura]" } else { "" }
    );

    // 3. Montar; bloquea hasta el desmontaje, que sincroniza la imagen
    MinifsFilesystem::new(fs, config).run(&cli.mountpoint)
}
