//! The mmap-backed core file.
//!
//! The image is shared with the filesystem (`MAP_SHARED`), truncated
//! to exactly `size_of::<CoreImage>()` on open, and synchronized back
//! on drop, so a core file can be watched or edited with a hex viewer
//! while the machine is stopped.

use std::fs::OpenOptions;
use std::mem::size_of;
use std::path::Path;

use memmap2::MmapMut;
use tracing::{event, Level};

use crate::fault::Fault;
use crate::memory::CoreImage;

pub struct MappedCore {
    map: MmapMut,
}

impl MappedCore {
    /// Open (creating if needed) a core file and map it read-write.
    pub fn open(path: &Path) -> Result<MappedCore, Fault> {
        let context = || format!("core image {}", path.display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| Fault::host(context(), e))?;
        // A short file would SIGBUS on first touch.
        file.set_len(size_of::<CoreImage>() as u64)
            .map_err(|e| Fault::host(context(), e))?;
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| Fault::host(context(), e))?;
        event!(Level::DEBUG, "mapped core image {}", path.display());
        Ok(MappedCore { map })
    }

    pub fn image(&self) -> &CoreImage {
        // SAFETY: the mapping is exactly size_of::<CoreImage>() bytes
        // and page-aligned; CoreImage is repr(C) and every field is a
        // plain 32-bit cell with no invalid bit patterns.
        unsafe { &*(self.map.as_ptr() as *const CoreImage) }
    }

    pub fn image_mut(&mut self) -> &mut CoreImage {
        // SAFETY: as for `image`, and the mutable borrow of self
        // guarantees exclusive access to the mapping.
        unsafe { &mut *(self.map.as_mut_ptr() as *mut CoreImage) }
    }
}

impl Drop for MappedCore {
    fn drop(&mut self) {
        if let Err(e) = self.map.flush() {
            event!(Level::ERROR, "failed to sync core image: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::prelude::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("mix-core-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn image_survives_reopen() {
        let path = scratch_path("reopen.core");
        {
            let mut mapped = MappedCore::open(&path).unwrap();
            mapped.image_mut().a = Word::from_value(-12345);
            mapped.image_mut().memory[2000] = Word::from_value(77);
        }
        let mapped = MappedCore::open(&path).unwrap();
        assert_eq!(mapped.image().a, Word::from_value(-12345));
        assert_eq!(mapped.image().memory[2000], Word::from_value(77));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_is_truncated_to_image_size() {
        let path = scratch_path("size.core");
        let _mapped = MappedCore::open(&path).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, std::mem::size_of::<CoreImage>() as u64);
        std::fs::remove_file(&path).unwrap();
    }
}
