//! Git's pack protocol multiplexes progress text onto stream `0x02` of the
//! side-band channel. Writing a sideband frame ahead of the real
//! `upload-pack` output lets a plain MOTD string show up as a progress line
//! in any client that understands the v1/v2 wire protocol, without
//! requiring the client to treat it as pack data.

use std::io::Write;

/// Frames `text` as a single pkt-line on side-band stream 2 (progress).
pub fn sideband_progress_pktline(text: &str) -> Vec<u8> {
    let mut payload = vec![0x02];
    payload.extend_from_slice(text.as_bytes());
    if !text.ends_with('\n') {
        payload.push(b'\n');
    }
    let len = payload.len() + 4;
    let mut out = format!("{len:04x}").into_bytes();
    out.extend_from_slice(&payload);
    out
}

pub fn write_motd<W: Write>(mut out: W, motd: &str) -> std::io::Result<()> {
    if motd.is_empty() {
        return Ok(());
    }
    out.write_all(&sideband_progress_pktline(motd))?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_a_single_line_motd() {
        let frame = sideband_progress_pktline("welcome");
        // 4 hex length bytes + 1 stream marker + "welcome\n" (8 bytes) = 13 = 0x0d
        assert_eq!(&frame[..4], b"000d");
        assert_eq!(frame[4], 0x02);
        assert_eq!(&frame[5..], b"welcome\n");
    }

    #[test]
    fn an_empty_motd_writes_nothing() {
        let mut buf = Vec::new();
        write_motd(&mut buf, "").unwrap();
        assert!(buf.is_empty());
    }
}
