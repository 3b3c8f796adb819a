//! Classic libpcap capture files.
//!
//! One file per traced device, named `<prefix>-<node>-<device>.pcap`
//! where `<device>` is the device's index on its node. Records carry
//! microsecond timestamps in virtual time.
//!
//! A transmitted frame is stamped with the time it starts on the medium,
//! which can be later than frames received while it waited. Records are
//! therefore held until [`PcapWriter::finish`] and written in timestamp
//! order, ties in arrival order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SimResult;
use crate::time::VirtualTime;

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const PCAP_SNAPLEN: u32 = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkType {
    Ethernet,
    /// IEEE 802.15.4 without FCS.
    Ieee802154NoFcs,
}

impl LinkType {
    pub fn code(self) -> u32 {
        match self {
            LinkType::Ethernet => 1,
            LinkType::Ieee802154NoFcs => 230,
        }
    }
}

/// `<prefix>-<node>-<device>.pcap`
pub fn capture_file_name(prefix: &str, node: u32, device_index: usize) -> String {
    format!("{}-{}-{}.pcap", prefix, node, device_index)
}

#[derive(Debug)]
pub struct PcapWriter {
    path: PathBuf,
    out: BufWriter<File>,
    pending: BTreeMap<(VirtualTime, u64), Vec<u8>>,
    records: u64,
}

impl PcapWriter {
    /// Create (truncate) `path` and write the global header.
    pub fn create(path: impl AsRef<Path>, link_type: LinkType) -> SimResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut out = BufWriter::new(File::create(&path)?);
        out.write_all(&PCAP_MAGIC.to_le_bytes())?;
        out.write_all(&PCAP_VERSION_MAJOR.to_le_bytes())?;
        out.write_all(&PCAP_VERSION_MINOR.to_le_bytes())?;
        out.write_all(&0i32.to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&PCAP_SNAPLEN.to_le_bytes())?;
        out.write_all(&link_type.code().to_le_bytes())?;
        Ok(PcapWriter {
            path,
            out,
            pending: BTreeMap::new(),
            records: 0,
        })
    }

    /// Queue one record. Nothing reaches the file before `finish`.
    pub fn write_record(&mut self, time: VirtualTime, bytes: &[u8]) {
        self.pending.insert((time, self.records), bytes.to_vec());
        self.records += 1;
    }

    fn write_one(out: &mut BufWriter<File>, time: VirtualTime, bytes: &[u8]) -> SimResult<()> {
        let micros = time.as_micros();
        let secs = (micros / 1_000_000) as u32;
        let usecs = (micros % 1_000_000) as u32;
        let captured = bytes.len().min(PCAP_SNAPLEN as usize);
        out.write_all(&secs.to_le_bytes())?;
        out.write_all(&usecs.to_le_bytes())?;
        out.write_all(&(captured as u32).to_le_bytes())?;
        out.write_all(&(bytes.len() as u32).to_le_bytes())?;
        out.write_all(&bytes[..captured])?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush and close, returning the path written.
    pub fn finish(mut self) -> SimResult<PathBuf> {
        for ((time, _), bytes) in std::mem::take(&mut self.pending) {
            Self::write_one(&mut self.out, time, &bytes)?;
        }
        self.out.flush()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(capture_file_name("ami-lrwpan", 2, 0), "ami-lrwpan-2-0.pcap");
    }

    #[test]
    fn test_header_and_record_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.pcap");
        let mut w = PcapWriter::create(&path, LinkType::Ieee802154NoFcs).unwrap();
        w.write_record(VirtualTime::from_micros(3_000_250), &[1, 2, 3]);
        assert_eq!(w.records(), 1);
        w.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 24 + 16 + 3);
        assert_eq!(&bytes[0..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert_eq!(u32::from_le_bytes(bytes[20..24].try_into().unwrap()), 230);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 250);
        assert_eq!(u32::from_le_bytes(bytes[32..36].try_into().unwrap()), 3);
        assert_eq!(&bytes[40..], &[1, 2, 3]);
    }

    #[test]
    fn test_records_written_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.pcap");
        let mut w = PcapWriter::create(&path, LinkType::Ethernet).unwrap();
        // A queued transmission stamped ahead of a later-seen reception.
        w.write_record(VirtualTime::from_millis(5), &[0xaa]);
        w.write_record(VirtualTime::from_millis(2), &[0xbb]);
        w.write_record(VirtualTime::from_millis(5), &[0xcc]);
        w.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let mut offset = 24;
        let mut seen = Vec::new();
        while offset < bytes.len() {
            let usecs = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
            seen.push((usecs, bytes[offset + 16]));
            offset += 17;
        }
        assert_eq!(seen, vec![(2_000, 0xbb), (5_000, 0xaa), (5_000, 0xcc)]);
    }
}
