// src/bin/mkfs_minifs.rs
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use minifs::layout::{DEFAULT_FS_NAME, DEFAULT_TOTAL_BLOCKS, DEFAULT_TOTAL_INODES};
use minifs::mkfs::{build_layout, format, FormatOptions, SeedFile};

/// Crea una imagen MiniFS nueva.
#[derive(Parser)]
#[command(name = "mkfs.minifs", version)]
struct Cli {
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    #[arg(long, default_value_t = DEFAULT_TOTAL_BLOCKS)]
    blocks: u32,

    #[arg(long, default_value_t = DEFAULT_TOTAL_INODES)]
    inodes: u32,

    /// Nombre guardado en el superblock (máximo 15 bytes)
    #[arg(long, default_value = DEFAULT_FS_NAME)]
    label: String,

    /// Agrega hello.txt con un saludo
    #[arg(long)]
    hello: bool,

    /// Copia un archivo del host: NOMBRE=RUTA (repetible)
    #[arg(long = "file", value_name = "NAME=HOSTPATH")]
    files: Vec<String>,
}

fn parse_seed(arg: &str) -> Result<SeedFile> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Formato inválido {:?}; se espera NOMBRE=RUTA", arg))?;
    let content =
        fs::read(path).with_context(|| format!("No se pudo leer el archivo {:?}", path))?;
    Ok(SeedFile {
        name: name.to_string(),
        content,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // 1. Archivos a sembrar
    let mut seed = Vec::new();
    if cli.hello {
        seed.push(SeedFile::hello());
    }
    for arg in &cli.files {
        seed.push(parse_seed(arg)?);
    }

    // 2. Construir la imagen en memoria
    let layout = build_layout(cli.blocks, cli.inodes)?;
    let opts = FormatOptions {
        total_blocks: cli.blocks,
        total_inodes: cli.inodes,
        label: cli.label,
        seed,
    };
    let bytes = format(&opts)?;
    info!("layout: {:?}", layout);

    // 3. Escribirla de una sola vez
    fs::write(&cli.image, &bytes)
        .with_context(|| format!("No se pudo escribir la imagen {:?}", cli.image))?;

    println!(
        "mkfs.minifs: {:?} creado con {} bloques ({} de datos), {} inodos, {} archivo(s).",
        cli.image,
        layout.total_blocks,
        layout.total_blocks - layout.first_data_block,
        layout.total_inodes,
        opts.seed.len()
    );

    Ok(())
}
