//! File version of Windows executables.
//!
//! Reads the `VS_FIXEDFILEINFO` block from the version resource of a PE
//! image. Rather than walking the resource directory, the image is scanned
//! for the fixed-info signature; the block is only accepted when the
//! structure version that follows is `1.0`.

use std::path::Path;

const SIGNATURE: [u8; 4] = 0xFEEF_04BD_u32.to_le_bytes();
const STRUC_VERSION: u32 = 0x0001_0000;

/// `a.b.c.d` from the executable's fixed file info, if present.
pub(crate) fn file_version(path: &Path) -> Option<String> {
    let image = std::fs::read(path).ok()?;
    version_from_image(&image)
}

fn version_from_image(image: &[u8]) -> Option<String> {
    if !is_pe(image) {
        return None;
    }

    image
        .windows(SIGNATURE.len())
        .enumerate()
        .filter(|(_, window)| *window == SIGNATURE)
        .find_map(|(offset, _)| fixed_info_at(image, offset))
}

fn is_pe(image: &[u8]) -> bool {
    if !image.starts_with(b"MZ") {
        return false;
    }
    let Some(lfanew) = read_u32(image, 0x3c) else {
        return false;
    };
    usize::try_from(lfanew)
        .ok()
        .and_then(|at| image.get(at..at + 4))
        .is_some_and(|magic| magic == b"PE\0\0")
}

fn fixed_info_at(image: &[u8], offset: usize) -> Option<String> {
    if read_u32(image, offset + 4)? != STRUC_VERSION {
        return None;
    }
    let ms = read_u32(image, offset + 8)?;
    let ls = read_u32(image, offset + 12)?;
    Some(format!(
        "{}.{}.{}.{}",
        ms >> 16,
        ms & 0xffff,
        ls >> 16,
        ls & 0xffff
    ))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}
