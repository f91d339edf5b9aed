//! SOI/EOI scanning over preview datagrams.
//!
//! Lumix preview packets carry a vendor header in front of a baseline JPEG. The scanner
//! skips whatever precedes the start-of-image marker and tolerates frames split across
//! several datagrams.

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];

const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// Byte range of the first complete JPEG in `data`, end exclusive.
pub fn frame_bounds(data: &[u8]) -> Option<(usize, usize)> {
    let start = find(data, &SOI)?;
    let end = find(&data[start + 2..], &EOI)? + start + 4;
    Some((start, end))
}

#[derive(Debug, Default)]
pub struct FrameScanner {
    pending: Vec<u8>,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet and returns the newest frame completed by it, if any.
    pub fn push(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        self.pending.extend_from_slice(packet);
        if self.pending.len() > MAX_PENDING_BYTES {
            let excess = self.pending.len() - MAX_PENDING_BYTES;
            self.pending.drain(..excess);
        }

        let mut newest = None;
        while let Some((start, end)) = frame_bounds(&self.pending) {
            newest = Some(self.pending[start..end].to_vec());
            self.pending.drain(..end);
        }

        // an opened frame waits for the rest of its bytes
        if let Some(start) = find(&self.pending, &SOI) {
            self.pending.drain(..start);
            return newest;
        }

        // a trailing 0xFF may be the first half of the next SOI
        let split_marker = self.pending.last() == Some(&SOI[0]);
        self.pending.clear();
        if split_marker {
            self.pending.push(SOI[0]);
        }
        newest
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn find(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}
