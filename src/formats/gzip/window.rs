//! Raw zlib inflate state machine.
//!
//! `flate2`'s safe API has no equivalent of `inflatePrime`/`inflateSetDictionary`
//! at an arbitrary bit offset, nor `Z_BLOCK`'s `data_type` block-boundary
//! signal, so this talks to `libz-sys` directly. The shape mirrors
//! `GzipReaderInternal::GzipReaderBase` in the original implementation
//! (`GzipReader.h`/`.cpp`): lazy `inflateInit2`, a `step` that refills input
//! and flushes output via caller-supplied closures, and a `block` helper
//! that steps with `Z_BLOCK` until zlib reports it has stopped at a deflate
//! block boundary.

use std::io;
use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_void};

use libz_sys as zlib;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    /// Full gzip header/trailer (`16 + MAX_WBITS`).
    Gzip,
    /// Raw deflate, no header (`-MAX_WBITS`), used once positioned inside
    /// the stream at an arbitrary block boundary.
    Raw,
}

const MAX_WBITS: c_int = 15;

impl Wrapper {
    fn window_bits(self) -> c_int {
        match self {
            Wrapper::Gzip => 16 + MAX_WBITS,
            Wrapper::Raw => -MAX_WBITS,
        }
    }
}

/// A zlib `data_type & 128` bit set means inflate stopped right after a
/// deflate block boundary, which is what `block()` below watches for.
const BLOCK_BOUNDARY_BIT: c_int = 128;

extern "C" fn alloc_fn(_opaque: *mut c_void, items: u32, size: u32) -> *mut c_void {
    unsafe { libc::calloc(items as usize, size as usize) as *mut c_void }
}

extern "C" fn free_fn(_opaque: *mut c_void, addr: *mut c_void) {
    unsafe { libc::free(addr) }
}

pub struct RawInflate {
    stream: zlib::z_stream,
    initialized: bool,
    wrapper: Wrapper,
    input: Vec<u8>,
    out_bytes: u64,
}

fn check(context: &'static str, err: c_int) -> Result<()> {
    if err == zlib::Z_OK || err == zlib::Z_STREAM_END {
        Ok(())
    } else {
        Err(Error::codec("gzip", 0, format!("{context}: zlib error {err}")))
    }
}

impl RawInflate {
    pub fn new(wrapper: Wrapper) -> Self {
        let stream = unsafe {
            let mut s = MaybeUninit::<zlib::z_stream>::zeroed().assume_init();
            s.zalloc = alloc_fn;
            s.zfree = free_fn;
            s.opaque = std::ptr::null_mut();
            s
        };
        RawInflate {
            stream,
            initialized: false,
            wrapper,
            input: Vec::new(),
            out_bytes: 0,
        }
    }

    fn ensure_init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let version = unsafe { zlib::zlibVersion() };
        let stream_size = std::mem::size_of::<zlib::z_stream>() as c_int;
        let err = unsafe {
            zlib::inflateInit2_(&mut self.stream, self.wrapper.window_bits(), version, stream_size)
        };
        check("inflateInit2", err)?;
        self.initialized = true;
        Ok(())
    }

    /// Tears down and reinitializes inflate state for a new wrapper mode,
    /// used when repositioning mid-stream (`SavingGzipReader::save`'s
    /// `reset(Raw)`).
    pub fn reset(&mut self, wrapper: Wrapper) -> Result<()> {
        if self.initialized {
            unsafe {
                zlib::inflateEnd(&mut self.stream);
            }
            self.initialized = false;
        }
        self.wrapper = wrapper;
        self.out_bytes = 0;
        self.ensure_init()
    }

    pub fn prime(&mut self, byte: u8, bits: u8) -> Result<()> {
        self.ensure_init()?;
        if bits == 0 {
            return Ok(());
        }
        let value = (byte >> (8 - bits)) as c_int;
        let err = unsafe { zlib::inflatePrime(&mut self.stream, bits as c_int, value) };
        check("inflatePrime", err)
    }

    pub fn set_dictionary(&mut self, dict: &[u8]) -> Result<()> {
        self.ensure_init()?;
        if dict.is_empty() {
            return Ok(());
        }
        let err = unsafe {
            zlib::inflateSetDictionary(&mut self.stream, dict.as_ptr(), dict.len() as u32)
        };
        check("inflateSetDictionary", err)
    }

    /// Bits consumed into the current (partial) input byte; mirrors
    /// `GzipReaderBase::ibits`.
    pub fn ibits(&self) -> u8 {
        (self.stream.data_type & 7) as u8
    }

    pub fn at_block_boundary(&self) -> bool {
        self.stream.data_type & BLOCK_BOUNDARY_BIT != 0
    }

    pub fn avail_in(&self) -> u32 {
        self.stream.avail_in
    }

    pub fn total_out(&self) -> u64 {
        self.out_bytes
    }

    /// One `inflate()` call, refilling `self.input` via `more_data` when
    /// exhausted and handing completed output to `write_out` when the
    /// caller's output buffer fills. Returns the raw zlib status.
    pub fn step(
        &mut self,
        more_data: &mut dyn FnMut(&mut Vec<u8>) -> io::Result<()>,
        out_buf: &mut [u8],
        out_pos: &mut usize,
        flush: c_int,
    ) -> Result<c_int> {
        self.ensure_init()?;
        unsafe {
            if self.stream.avail_in == 0 {
                more_data(&mut self.input)?;
                self.stream.avail_in = self.input.len() as u32;
                self.stream.next_in = self.input.as_mut_ptr();
            }
            self.stream.next_out = out_buf.as_mut_ptr().add(*out_pos);
            self.stream.avail_out = (out_buf.len() - *out_pos) as u32;

            let before = self.stream.avail_out;
            let err = zlib::inflate(&mut self.stream, flush);
            let produced = before - self.stream.avail_out;
            *out_pos += produced as usize;
            self.out_bytes += produced as u64;
            Ok(err)
        }
    }

}

pub const Z_BLOCK: c_int = zlib::Z_BLOCK;
pub const Z_OK: c_int = zlib::Z_OK;
pub const Z_STREAM_END: c_int = zlib::Z_STREAM_END;

impl Drop for RawInflate {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                zlib::inflateEnd(&mut self.stream);
            }
        }
    }
}

// z_stream is not Send by default because it holds raw pointers into
// buffers we own exclusively; every RawInflate is confined to the worker
// that created it; no cache entry ever shares one across threads.
unsafe impl Send for RawInflate {}
