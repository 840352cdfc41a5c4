// src/fuse.rs
//
// Adaptador FUSE. El kernel numera los inodos desde 1 (la raíz es
// FUSE_ROOT_ID), MiniFS desde 0: ino FUSE = índice + 1.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
    FUSE_ROOT_ID,
};
use libc::{c_int, EINVAL, ENOENT, EOPNOTSUPP, EROFS};
use log::{debug, error, info, warn};

use crate::error::FsError;
use crate::fs::{FileAttributes, Minifs};
use crate::layout::{InodeKind, ROOT_INODE};

const TTL: Duration = Duration::from_secs(1);

// -----------------------------------------------------------------------------
// Traducciones entre MiniFS y FUSE
// -----------------------------------------------------------------------------

pub fn to_fuse_ino(ino: u32) -> u64 {
    ino as u64 + 1
}

/// `None` para el 0 (no existe en FUSE) o números que no caben en u32.
pub fn from_fuse_ino(ino: u64) -> Option<u32> {
    ino.checked_sub(1).and_then(|i| u32::try_from(i).ok())
}

fn file_type(kind: InodeKind) -> FileType {
    match kind {
        InodeKind::Directory => FileType::Directory,
        InodeKind::RegularFile | InodeKind::Free => FileType::RegularFile,
    }
}

fn epoch(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs as u64)
}

/// Los dueños no se guardan por completo en disco: se reporta a quien pregunta.
pub fn file_attr(attrs: &FileAttributes, block_size: u32, uid: u32, gid: u32) -> FileAttr {
    let nlink = match (attrs.kind, attrs.ino) {
        (InodeKind::Directory, ROOT_INODE) => 2,
        _ => attrs.link_count.max(1) as u32,
    };
    FileAttr {
        ino: to_fuse_ino(attrs.ino),
        size: attrs.size as u64,
        // unidades de 512 bytes
        blocks: attrs.blocks as u64 * (block_size as u64 / 512),
        atime: epoch(attrs.modified_time),
        mtime: epoch(attrs.modified_time),
        ctime: epoch(attrs.created_time),
        crtime: epoch(attrs.created_time),
        kind: file_type(attrs.kind),
        perm: attrs.perm,
        nlink,
        uid,
        gid,
        rdev: 0,
        blksize: block_size,
        flags: 0,
    }
}

/// En montajes de solo lectura se rechaza escribir y también `O_TRUNC`.
fn check_open_flags(read_only: bool, flags: i32) -> Result<(), c_int> {
    let writes = flags & libc::O_ACCMODE != libc::O_RDONLY || flags & libc::O_TRUNC != 0;
    if read_only && writes {
        return Err(EROFS);
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Configuración de montaje
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct MountConfig {
    pub read_only: bool,
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            allow_other: false,
            auto_unmount: true,
        }
    }
}

impl MountConfig {
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName("minifs".to_string()),
            if self.read_only {
                MountOption::RO
            } else {
                MountOption::RW
            },
        ];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        options
    }
}

// -----------------------------------------------------------------------------
// Estructura principal
// -----------------------------------------------------------------------------

pub struct MinifsFilesystem {
    inner: RwLock<Minifs>,
    config: MountConfig,
}

impl MinifsFilesystem {
    pub fn new(fs: Minifs, config: MountConfig) -> Self {
        Self {
            inner: RwLock::new(fs),
            config,
        }
    }

    /// Monta el FS con FUSE y bloquea hasta que se desmonte.
    pub fn run(self, mountpoint: &Path) -> Result<()> {
        let options = self.config.mount_options();
        info!("montando MiniFS en {:?} ({:?})", mountpoint, options);
        fuser::mount2(self, mountpoint, &options)
            .with_context(|| format!("no se pudo montar en {:?}", mountpoint))
    }

    // Un lock envenenado se sigue usando.
    fn state(&self) -> RwLockReadGuard<'_, Minifs> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, Minifs> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn attr_of(fs: &Minifs, ino: u32, req: &Request<'_>) -> Result<FileAttr, FsError> {
        let attrs = fs.attributes_at(ino)?;
        Ok(file_attr(&attrs, fs.image().block_size(), req.uid(), req.gid()))
    }

    /// Valida padre y nombre de una operación dentro de la raíz.
    fn child_name<'a>(parent: u64, name: &'a OsStr) -> Result<&'a str, c_int> {
        if parent != FUSE_ROOT_ID {
            return Err(ENOENT);
        }
        name.to_str().ok_or(EINVAL)
    }

    fn sync_or_log(fs: &Minifs) -> Result<(), c_int> {
        fs.sync().map_err(|e| {
            error!("no se pudo sincronizar la imagen: {e}");
            e.as_errno()
        })
    }
}

// -----------------------------------------------------------------------------
// Implementación FUSE
// -----------------------------------------------------------------------------

impl Filesystem for MinifsFilesystem {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        let stats = self.state().statfs();
        info!(
            "MiniFS listo: {}/{} bloques libres, {}/{} inodos libres",
            stats.free_blocks, stats.total_blocks, stats.free_inodes, stats.total_inodes
        );
        Ok(())
    }

    fn destroy(&mut self) {
        if self.config.read_only {
            return;
        }
        if let Err(e) = self.state().sync() {
            error!("no se pudo sincronizar al desmontar: {e}");
        }
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup: parent = {parent}, name = {:?}", name);
        let name = match Self::child_name(parent, name) {
            Ok(n) => n,
            Err(code) => {
                reply.error(code);
                return;
            }
        };

        let fs = self.state();
        match fs.lookup(name).and_then(|ino| Self::attr_of(&fs, ino, req)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(idx) = from_fuse_ino(ino) else {
            reply.error(ENOENT);
            return;
        };
        let fs = self.state();
        match Self::attr_of(&fs, idx, req) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    // setattr: solo se soporta cambiar el tamaño (truncate)
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: ino = {ino}, size = {:?}", size);
        let Some(idx) = from_fuse_ino(ino) else {
            reply.error(ENOENT);
            return;
        };

        let mut fs = self.state_mut();
        if let Some(size) = size {
            if self.config.read_only {
                reply.error(EROFS);
                return;
            }
            if let Err(e) = fs.truncate_at(idx, size) {
                reply.error(e.as_errno());
                return;
            }
        }
        match Self::attr_of(&fs, idx, req) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(idx) = from_fuse_ino(ino) else {
            reply.error(ENOENT);
            return;
        };
        if self.config.read_only && mask & libc::W_OK != 0 {
            reply.error(EROFS);
            return;
        }
        match self.state().attributes_at(idx) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(idx) = from_fuse_ino(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.state().attributes_at(idx) {
            Ok(attrs) if attrs.kind == InodeKind::Directory => reply.opened(ino, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino = {ino}, offset = {offset}");
        let Some(idx) = from_fuse_ino(ino) else {
            reply.error(ENOENT);
            return;
        };

        let entries = match self.state().list_directory_at(idx) {
            Ok(e) => e,
            Err(e) => {
                reply.error(e.as_errno());
                return;
            }
        };

        // "." y ".." ocupan los offsets 1 y 2; todo directorio cuelga de la raíz
        let dots = [(ino, "."), (FUSE_ROOT_ID, "..")];
        let listing = dots
            .iter()
            .map(|&(i, n)| (i, FileType::Directory, n))
            .chain(
                entries
                    .iter()
                    .map(|e| (to_fuse_ino(e.ino), file_type(e.kind), e.name.as_str())),
            );

        for (i, (child, kind, name)) in listing.enumerate().skip(offset.max(0) as usize) {
            if reply.add(child, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino = {ino}, flags = {flags:#o}");
        let Some(idx) = from_fuse_ino(ino) else {
            reply.error(ENOENT);
            return;
        };
        if let Err(code) = check_open_flags(self.config.read_only, flags) {
            reply.error(code);
            return;
        }

        let mut fs = self.state_mut();
        match fs.attributes_at(idx) {
            Ok(attrs) if attrs.kind == InodeKind::Directory => {
                reply.error(libc::EISDIR);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                reply.error(e.as_errno());
                return;
            }
        }
        if flags & libc::O_TRUNC != 0 {
            if let Err(e) = fs.truncate_at(idx, 0) {
                reply.error(e.as_errno());
                return;
            }
        }
        reply.opened(ino, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino = {ino}, offset = {offset}, size = {size}");
        let (Some(idx), Ok(offset)) = (from_fuse_ino(ino), u64::try_from(offset)) else {
            reply.error(EINVAL);
            return;
        };
        match self.state().read_at(idx, offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino = {ino}, offset = {offset}, len = {}", data.len());
        if self.config.read_only {
            reply.error(EROFS);
            return;
        }
        let (Some(idx), Ok(offset)) = (from_fuse_ino(ino), u64::try_from(offset)) else {
            reply.error(EINVAL);
            return;
        };
        match self.state_mut().write_at(idx, offset, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => {
                warn!("write rechazado en ino {ino}: {e}");
                reply.error(e.as_errno());
            }
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create: parent = {parent}, name = {:?}, mode = {mode:#o}", name);
        if self.config.read_only {
            reply.error(EROFS);
            return;
        }
        let name = match Self::child_name(parent, name) {
            Ok(n) => n,
            Err(code) => {
                reply.error(code);
                return;
            }
        };

        let mut fs = self.state_mut();
        match fs
            .create(name, InodeKind::RegularFile, mode & !umask)
            .and_then(|ino| Self::attr_of(&fs, ino, req))
        {
            Ok(attr) => reply.created(&TTL, &attr, 0, attr.ino, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        if self.config.read_only {
            reply.error(EROFS);
            return;
        }
        if mode & libc::S_IFMT != libc::S_IFREG {
            reply.error(EOPNOTSUPP);
            return;
        }
        let name = match Self::child_name(parent, name) {
            Ok(n) => n,
            Err(code) => {
                reply.error(code);
                return;
            }
        };

        let mut fs = self.state_mut();
        match fs
            .create(name, InodeKind::RegularFile, mode & !umask)
            .and_then(|ino| Self::attr_of(&fs, ino, req))
        {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir: parent = {parent}, name = {:?}", name);
        if self.config.read_only {
            reply.error(EROFS);
            return;
        }
        let name = match Self::child_name(parent, name) {
            Ok(n) => n,
            Err(code) => {
                reply.error(code);
                return;
            }
        };

        let mut fs = self.state_mut();
        match fs
            .mkdir(name, mode & !umask)
            .and_then(|ino| Self::attr_of(&fs, ino, req))
        {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink: parent = {parent}, name = {:?}", name);
        if self.config.read_only {
            reply.error(EROFS);
            return;
        }
        match Self::child_name(parent, name) {
            Ok(name) => match self.state_mut().unlink(name) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.as_errno()),
            },
            Err(code) => reply.error(code),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir: parent = {parent}, name = {:?}", name);
        if self.config.read_only {
            reply.error(EROFS);
            return;
        }
        match Self::child_name(parent, name) {
            Ok(name) => match self.state_mut().rmdir(name) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.as_errno()),
            },
            Err(code) => reply.error(code),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!("rename: {:?} -> {:?}, flags = {flags}", name, newname);
        if self.config.read_only {
            reply.error(EROFS);
            return;
        }
        // RENAME_NOREPLACE, RENAME_EXCHANGE, ...
        if flags != 0 {
            reply.error(EINVAL);
            return;
        }
        let names = Self::child_name(parent, name)
            .and_then(|from| Self::child_name(newparent, newname).map(|to| (from, to)));
        match names {
            Ok((from, to)) => match self.state_mut().rename(from, to) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.as_errno()),
            },
            Err(code) => reply.error(code),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        debug!("flush: ino = {ino}");
        if self.config.read_only {
            reply.ok();
            return;
        }
        match Self::sync_or_log(&self.state()) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        debug!("fsync: ino = {ino}");
        if self.config.read_only {
            reply.ok();
            return;
        }
        match Self::sync_or_log(&self.state()) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = self.state().statfs();
        reply.statfs(
            stats.total_blocks as u64,
            stats.free_blocks as u64,
            stats.free_blocks as u64,
            stats.total_inodes as u64,
            stats.free_inodes as u64,
            stats.block_size,
            stats.name_max,
            stats.block_size,
        );
    }
}
