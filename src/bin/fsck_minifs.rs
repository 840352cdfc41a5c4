// src/bin/fsck_minifs.rs
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use minifs::fsck::{repair, run_fsck, FsckReport, RawImage};

/// Revisa la consistencia de una imagen MiniFS.
#[derive(Parser)]
#[command(name = "fsck.minifs", version)]
struct Cli {
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Compacta el directorio raíz y recalcula los contadores libres
    #[arg(long)]
    repair: bool,
}

fn section(title: &str, ok: bool, what: &str) {
    println!("\n{}", title.bold().underline());
    if ok {
        println!("  {} {} OK", "✓".green(), what);
    } else {
        println!("  {} Errores en {}", "✗".red(), what.to_lowercase());
    }
}

fn print_report(rep: &FsckReport) {
    println!("\n{}", " MINIFS FILESYSTEM CHECK ".on_blue().bold());
    println!("{}", "──────────────────────────────────────────".blue());

    section("Bloques", rep.blocks_ok, "Bloques");
    section("Inodos", rep.inodes_ok, "Inodos");
    section("Directorio raíz", rep.dirs_ok, "Directorio");

    // ——————————————————————————————————————————
    //       ERRORES DETALLADOS
    // ——————————————————————————————————————————
    println!("\n{}", "Errores detectados".bold().underline());
    if rep.errors.is_empty() {
        println!("  {} No se encontraron errores", "✓".green());
    } else {
        for err in &rep.errors {
            println!("  {} {}", "•".red(), err.red());
        }
    }

    // ——————————————————————————————————————————
    //       RESUMEN FINAL
    // ——————————————————————————————————————————
    println!("\n{}", "Resumen".bold().underline());
    if rep.is_clean() {
        println!("{} Sistema de archivos limpio.\n", "✓ OK".green().bold());
    } else {
        println!(
            "{} {} errores encontrados.\n",
            "✗ FSCK completado con errores:".red().bold(),
            rep.errors.len().to_string().yellow()
        );
    }
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    let mut bytes = fs::read(&cli.image)
        .with_context(|| format!("No se pudo leer la imagen {:?}", cli.image))?;

    let mut rep = run_fsck(&RawImage::new(&bytes));
    print_report(&rep);

    if cli.repair && !rep.is_clean() {
        let (fixed, actions) = repair(bytes).context("La imagen no se puede reparar")?;
        println!("{}", "Reparación".bold().underline());
        if actions.is_empty() {
            println!("  {} Nada que corregir automáticamente", "•".yellow());
        }
        for action in &actions {
            println!("  {} {}", "✓".green(), action);
        }

        if !actions.is_empty() {
            fs::write(&cli.image, &fixed)
                .with_context(|| format!("No se pudo escribir la imagen {:?}", cli.image))?;
        }
        bytes = fixed;

        rep = run_fsck(&RawImage::new(&bytes));
        print_report(&rep);
    }

    Ok(if rep.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
