//! Minimal ZIP structural parsing: just enough to locate ZipCrypto-encrypted
//! entries and extract what the cryptanalytic engines need from them.
//!
//! This deliberately doesn't use a general-purpose ZIP crate. Those
//! abstract away exactly the bytes this crate needs raw access to (the
//! 12-byte encrypted header, the entry's offset within the file, whether
//! the trailing CRC came from a data descriptor or the local header), and
//! they try to support far more of the format than password recovery ever
//! touches.

use std::io;

use crate::cipher::ENCRYPTION_HEADER_LEN;
use crate::error::{CrackError, Result};

const EOCD_SIG: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const EOCD64_LOCATOR_SIG: [u8; 4] = [0x50, 0x4B, 0x06, 0x07];
const EOCD64_SIG: [u8; 4] = [0x50, 0x4B, 0x06, 0x06];
const CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
const LOCAL_HEADER_SIG: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

const ZIP64_EXTRA_TAG: u16 = 0x0001;
const GP_FLAG_ENCRYPTED: u16 = 1 << 0;
const GP_FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
const METHOD_AES: u16 = 99;

/// Filenames longer than this are rejected as out of scope rather than
/// trusted at face value from a potentially malformed archive.
const MAX_NAME_LEN: usize = 4096;

/// One ZipCrypto-encrypted entry located in the archive: its 12-byte
/// encrypted header and the single magic byte the header must decrypt to.
#[derive(Clone, Debug)]
pub struct EncryptedEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub method: u16,
    pub crc32: u32,
    pub header: [u8; ENCRYPTION_HEADER_LEN],
    pub data_offset: u64,
    pub uses_data_descriptor: bool,
}

impl EncryptedEntry {
    /// The byte the header must decrypt to, per the GP flag bit 3 rule:
    /// when a data descriptor follows (streamed output, CRC not known up
    /// front), the magic byte is the high byte of the last-modified time
    /// instead of the high byte of the CRC.
    pub fn magic_byte(&self, last_mod_time_hi: u8) -> u8 {
        if self.uses_data_descriptor {
            last_mod_time_hi
        } else {
            (self.crc32 >> 24) as u8
        }
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(data[at..at + 8].try_into().unwrap())
}

fn malformed(reason: impl Into<String>) -> CrackError {
    CrackError::ArchiveFormat {
        reason: reason.into(),
    }
}

/// Scans backward from the end of the file for the end-of-central-directory
/// record, then follows it (and, if present, the Zip64 locator) to the
/// central directory.
fn find_eocd(data: &[u8]) -> Result<usize> {
    // The EOCD is at most 22 + 65535 (max comment length) bytes from the end.
    let scan_from = data.len().saturating_sub(22 + 65535);
    data[scan_from..]
        .windows(4)
        .rposition(|w| w == EOCD_SIG)
        .map(|pos| scan_from + pos)
        .ok_or_else(|| malformed("no end-of-central-directory record found"))
}

struct CentralDirInfo {
    offset: u64,
    count: u64,
}

fn central_dir_info(data: &[u8]) -> Result<CentralDirInfo> {
    let eocd = find_eocd(data)?;
    let disk_number = read_u16(data, eocd + 4);
    let cd_start_disk = read_u16(data, eocd + 6);
    if disk_number != 0 || cd_start_disk != 0 {
        return Err(malformed("multi-disk archives are not supported"));
    }

    let mut count = read_u16(data, eocd + 10) as u64;
    let mut offset = read_u32(data, eocd + 16) as u64;

    if count == 0xffff || offset == 0xffff_ffff {
        let locator_pos = eocd
            .checked_sub(20)
            .filter(|&p| data[p..p + 4] == EOCD64_LOCATOR_SIG)
            .ok_or_else(|| malformed("Zip64 fields present but locator missing"))?;
        let eocd64_offset = read_u64(data, locator_pos + 8) as usize;
        if data.get(eocd64_offset..eocd64_offset + 4) != Some(&EOCD64_SIG) {
            return Err(malformed("Zip64 end-of-central-directory signature mismatch"));
        }
        let disk_number64 = read_u32(data, eocd64_offset + 16);
        let cd_start_disk64 = read_u32(data, eocd64_offset + 20);
        if disk_number64 != 0 || cd_start_disk64 != 0 {
            return Err(malformed("multi-disk archives are not supported"));
        }
        count = read_u64(data, eocd64_offset + 32);
        offset = read_u64(data, eocd64_offset + 48);
    }

    Ok(CentralDirInfo { offset, count })
}

/// An entry parsed from the central directory, used only to walk to the
/// matching local file header.
struct CentralDirEntry {
    method: u16,
    gp_flag: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    name: String,
}

fn parse_central_dir(data: &[u8], info: &CentralDirInfo) -> Result<Vec<CentralDirEntry>> {
    let mut entries = Vec::with_capacity(info.count as usize);
    let mut pos = info.offset as usize;

    for _ in 0..info.count {
        if data.get(pos..pos + 4) != Some(&CENTRAL_DIR_SIG) {
            return Err(malformed("central directory entry signature mismatch"));
        }

        let gp_flag = read_u16(data, pos + 8);
        let method = read_u16(data, pos + 10);
        let crc32 = read_u32(data, pos + 16);
        let mut compressed_size = read_u32(data, pos + 20) as u64;
        let mut uncompressed_size = read_u32(data, pos + 24) as u64;
        let name_len = read_u16(data, pos + 28) as usize;
        let extra_len = read_u16(data, pos + 30) as usize;
        let comment_len = read_u16(data, pos + 32) as usize;
        let mut local_header_offset = read_u32(data, pos + 42) as u64;

        if name_len > MAX_NAME_LEN {
            return Err(malformed(format!(
                "central directory entry filename too long ({name_len} bytes)"
            )));
        }

        let name_start = pos + 46;
        let name = String::from_utf8_lossy(&data[name_start..name_start + name_len]).into_owned();

        let extra_start = name_start + name_len;
        let extra = &data[extra_start..extra_start + extra_len];
        parse_zip64_extra(
            extra,
            &mut uncompressed_size,
            &mut compressed_size,
            &mut local_header_offset,
        );

        entries.push(CentralDirEntry {
            method,
            gp_flag,
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            name,
        });

        pos = extra_start + extra_len + comment_len;
    }

    Ok(entries)
}

/// Fields are only present in the Zip64 extra block when their 32-bit
/// counterpart in the fixed header was the `0xffffffff` sentinel, and then
/// only in the fixed order: uncompressed size, compressed size, local
/// header offset, disk number.
fn parse_zip64_extra(extra: &[u8], uncompressed: &mut u64, compressed: &mut u64, offset: &mut u64) {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let tag = read_u16(extra, pos);
        let size = read_u16(extra, pos + 2) as usize;
        let body_start = pos + 4;
        if tag == ZIP64_EXTRA_TAG && body_start + size <= extra.len() {
            let body = &extra[body_start..body_start + size];
            let mut cursor = 0;
            if *uncompressed == 0xffff_ffff && cursor + 8 <= body.len() {
                *uncompressed = read_u64(body, cursor);
                cursor += 8;
            }
            if *compressed == 0xffff_ffff && cursor + 8 <= body.len() {
                *compressed = read_u64(body, cursor);
                cursor += 8;
            }
            if *offset == 0xffff_ffff && cursor + 8 <= body.len() {
                *offset = read_u64(body, cursor);
            }
            return;
        }
        pos = body_start + size;
    }
}

/// Parses every ZipCrypto-encrypted entry out of an archive already mapped
/// or loaded into memory.
pub fn locate_encrypted_entries(data: &[u8]) -> Result<Vec<EncryptedEntry>> {
    let info = central_dir_info(data)?;
    let central = parse_central_dir(data, &info)?;

    let mut out = Vec::new();
    for entry in central {
        if entry.gp_flag & GP_FLAG_ENCRYPTED == 0 {
            continue;
        }
        if entry.method == METHOD_AES {
            continue; // AES-encrypted entries aren't ZipCrypto; out of scope here.
        }
        if entry.compressed_size < ENCRYPTION_HEADER_LEN as u64 {
            return Err(malformed(format!(
                "encrypted entry {:?} has compressed size smaller than the encryption header",
                entry.name
            )));
        }

        let local = entry.local_header_offset as usize;
        if data.get(local..local + 4) != Some(&LOCAL_HEADER_SIG) {
            return Err(malformed(format!(
                "local file header signature mismatch for {:?}",
                entry.name
            )));
        }
        let name_len = read_u16(data, local + 26) as usize;
        if name_len > MAX_NAME_LEN {
            return Err(malformed(format!(
                "local file header filename too long ({name_len} bytes)"
            )));
        }
        let extra_len = read_u16(data, local + 28) as usize;
        let data_start = local + 30 + name_len + extra_len;

        if data.len() < data_start + ENCRYPTION_HEADER_LEN {
            return Err(malformed(format!("truncated archive at entry {:?}", entry.name)));
        }
        let mut header = [0u8; ENCRYPTION_HEADER_LEN];
        header.copy_from_slice(&data[data_start..data_start + ENCRYPTION_HEADER_LEN]);

        out.push(EncryptedEntry {
            name: entry.name,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
            method: entry.method,
            crc32: entry.crc32,
            header,
            data_offset: data_start as u64,
            uses_data_descriptor: entry.gp_flag & GP_FLAG_DATA_DESCRIPTOR != 0,
        });
    }

    if out.is_empty() {
        return Err(malformed("archive has no ZipCrypto-encrypted entries"));
    }

    Ok(out)
}

/// Memory-maps `path` and locates its encrypted entries.
pub fn open_and_locate(path: &std::path::Path) -> Result<(memmap2::Mmap, Vec<EncryptedEntry>)> {
    let file = std::fs::File::open(path).map_err(io_err)?;
    let mmap = unsafe { memmap2::Mmap::map(&file).map_err(io_err)? };
    let entries = locate_encrypted_entries(&mmap)?;
    Ok((mmap, entries))
}

fn io_err(e: io::Error) -> CrackError {
    CrackError::Io(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal single-entry, stored (uncompressed), ZipCrypto
    /// archive in memory, for the locator to parse.
    fn build_test_archive(name: &str, header: &[u8; 12], body: &[u8], crc: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let local_offset = 0u32;

        out.extend_from_slice(&LOCAL_HEADER_SIG);
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&(GP_FLAG_ENCRYPTED).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        out.extend_from_slice(&crc.to_le_bytes());
        let compressed_size = (header.len() + body.len()) as u32;
        out.extend_from_slice(&compressed_size.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.write_all(name.as_bytes()).unwrap();
        out.write_all(header).unwrap();
        out.write_all(body).unwrap();

        let central_dir_offset = out.len() as u32;
        out.extend_from_slice(&CENTRAL_DIR_SIG);
        out.extend_from_slice(&20u16.to_le_bytes()); // version made by
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&(GP_FLAG_ENCRYPTED).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&compressed_size.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.extend_from_slice(&0u16.to_le_bytes()); // comment len
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&local_offset.to_le_bytes());
        out.write_all(name.as_bytes()).unwrap();
        let central_dir_size = out.len() as u32 - central_dir_offset;

        out.extend_from_slice(&EOCD_SIG);
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number
        out.extend_from_slice(&0u16.to_le_bytes()); // cd start disk
        out.extend_from_slice(&1u16.to_le_bytes()); // entries on this disk
        out.extend_from_slice(&1u16.to_le_bytes()); // total entries
        out.extend_from_slice(&central_dir_size.to_le_bytes());
        out.extend_from_slice(&central_dir_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment len

        out
    }

    #[test]
    fn locates_a_single_stored_encrypted_entry() {
        let header = [0u8; 12];
        let body = b"hello".to_vec();
        let archive = build_test_archive("hello.txt", &header, &body, 0xdeadbeef);

        let entries = locate_encrypted_entries(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "hello.txt");
        assert_eq!(entries[0].header, header);
        assert_eq!(entries[0].crc32, 0xdeadbeef);
        assert!(!entries[0].uses_data_descriptor);
        assert_eq!(entries[0].magic_byte(0), 0xde);
    }

    #[test]
    fn rejects_an_archive_with_no_eocd() {
        assert!(locate_encrypted_entries(b"not a zip file").is_err());
    }
}
