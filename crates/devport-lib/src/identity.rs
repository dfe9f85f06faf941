//! Identity extraction from interface paths, hardware ids and friendly names.
//!
//! All functions here are total: malformed input yields `None` (or is
//! passed through), never a panic.

/// Canonical interface path prefix (`\\?\`).
pub const CANONICAL_PREFIX: &str = r"\\?\";

/// Find `marker` (ASCII, case-insensitive) followed by exactly four hex digits.
///
/// Every occurrence is tried; the first one with a well-formed run wins.
fn find_hex4_after(text: &[u8], marker: &[u8]) -> Option<u16> {
    if text.len() < marker.len() + 4 {
        return None;
    }
    (0..=text.len() - marker.len() - 4).find_map(|start| {
        let (head, rest) = text[start..].split_at(marker.len());
        if !head.eq_ignore_ascii_case(marker) {
            return None;
        }
        let digits = &rest[..4];
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        // A fifth hex digit means the run is not a 16-bit id.
        if rest.get(4).is_some_and(u8::is_ascii_hexdigit) {
            return None;
        }
        let s = std::str::from_utf8(digits).ok()?;
        u16::from_str_radix(s, 16).ok()
    })
}

/// Extract `(vendor_id, product_id)` from a path or hardware-id string.
///
/// Both `VID_xxxx` and `PID_yyyy` must be present (any order, any case);
/// a lone marker is not a partial identity.
pub fn extract_vid_pid(text: &str) -> Option<(u16, u16)> {
    let bytes = text.as_bytes();
    let vid = find_hex4_after(bytes, b"VID_")?;
    let pid = find_hex4_after(bytes, b"PID_")?;
    Some((vid, pid))
}

/// First `(vendor_id, product_id)` found in a NUL-separated hardware-id list.
///
/// Each id is parsed on its own, so markers from different ids never pair up.
pub fn vid_pid_from_hardware_ids(ids: &str) -> Option<(u16, u16)> {
    hardware_ids(ids).find_map(extract_vid_pid)
}

/// Device revision (`REV_xxxx`) from a NUL-separated hardware-id list.
pub fn revision_from_hardware_ids(ids: &str) -> Option<u16> {
    hardware_ids(ids).find_map(|id| find_hex4_after(id.as_bytes(), b"REV_"))
}

fn hardware_ids(ids: &str) -> impl Iterator<Item = &str> {
    ids.split('\0').filter(|id| !id.is_empty())
}

/// Longest digit run accepted after `COM`.
const MAX_PORT_DIGITS: usize = 5;

/// Extract a `COM<n>` port label, uppercased. First match wins.
pub fn extract_port_label(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 3 < bytes.len() {
        if bytes[i..i + 3].eq_ignore_ascii_case(b"COM") {
            let digits = bytes[i + 3..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if (1..=MAX_PORT_DIGITS).contains(&digits) {
                let n = &text[i + 3..i + 3 + digits];
                return Some(format!("COM{n}"));
            }
        }
        i += 1;
    }
    None
}

/// Parse an exact `COM<n>` port name into its number.
pub fn parse_port_name(name: &str) -> Option<u32> {
    let rest = name
        .get(..3)
        .filter(|p| p.eq_ignore_ascii_case("COM"))
        .map(|_| &name[3..])?;
    if rest.is_empty() || rest.len() > MAX_PORT_DIGITS || !rest.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    rest.parse().ok()
}

/// Format a port number as its canonical name.
pub fn format_port_name(n: u32) -> String {
    format!("COM{n}")
}

/// Accept a registry `PortName` only if it is already canonical
/// (parse → format reproduces it exactly).
pub fn canonical_port_name(value: &str) -> Option<String> {
    let value = value.trim_end_matches('\0').trim();
    let n = parse_port_name(value)?;
    let formatted = format_port_name(n);
    (formatted == value).then_some(formatted)
}

/// Rewrite a single-escaped interface path (`\?\` or `?\`) to the canonical
/// `\\?\` form. Anything else passes through unchanged.
pub fn normalize_path(raw: &str) -> String {
    if raw.starts_with(CANONICAL_PREFIX) {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix(r"\?\") {
        format!("{CANONICAL_PREFIX}{rest}")
    } else if let Some(rest) = raw.strip_prefix(r"?\") {
        format!("{CANONICAL_PREFIX}{rest}")
    } else {
        raw.to_string()
    }
}

/// Shape of a path for filesystem-name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeRoot {
    /// `X:\`
    Drive(String),
    /// `\\?\Volume{guid}\`
    VolumeGuid(String),
}

impl VolumeRoot {
    pub fn as_str(&self) -> &str {
        match self {
            VolumeRoot::Drive(s) | VolumeRoot::VolumeGuid(s) => s,
        }
    }
}

/// Classify a path as a volume root, or `None` for every other shape.
pub fn volume_root(path: &str) -> Option<VolumeRoot> {
    let b = path.as_bytes();
    if b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && b[2] == b'\\' {
        return Some(VolumeRoot::Drive(path[..3].to_string()));
    }

    let rest = path.strip_prefix(CANONICAL_PREFIX)?;
    let head = rest.get(..7)?;
    if !head.eq_ignore_ascii_case("Volume{") {
        return None;
    }
    let close = rest.find('}')?;
    let guid = &rest[7..close];
    if guid.is_empty() || !guid.bytes().all(|c| c.is_ascii_hexdigit() || c == b'-') {
        return None;
    }
    Some(VolumeRoot::VolumeGuid(format!(
        "{CANONICAL_PREFIX}{}\\",
        &rest[..=close]
    )))
}
