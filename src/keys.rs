//! Byte encodings of keystrokes for raw PTY injection.

/// tmux's default prefix, Ctrl-b.
pub const PREFIX: u8 = 0x02;
pub const ESC: &str = "\x1b";
/// Enter as a terminal sends it (carriage return, not line feed).
pub const ENTER: &str = "\r";
pub const TAB: &str = "\t";
pub const CTRL_C: &str = "\x03";
pub const CTRL_G: &str = "\x07";

/// Control-modified letter, e.g. `ctrl('b') == 0x02`.
pub fn ctrl(c: char) -> u8 {
    (c.to_ascii_lowercase() as u8) & 0x1f
}

/// Meta/Option-modified key as terminals with "meta sends escape" encode it.
pub fn meta(c: char) -> String {
    format!("{ESC}{c}")
}
