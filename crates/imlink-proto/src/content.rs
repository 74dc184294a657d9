//! `content_type` bit flags.
//!
//! A message may combine several flags, e.g. `TEXT | AT | QUOTE` for a quoted reply that
//! mentions someone.

pub const TEXT: u32 = 1;
pub const EMOJI: u32 = 1 << 1;
pub const SCREENSHOT: u32 = 1 << 2;
pub const AT: u32 = 1 << 3;
pub const QUOTE: u32 = 1 << 4;
pub const IMAGE: u32 = 0x200;
pub const RECORDING: u32 = 0x400;
pub const AUDIO: u32 = 0x800;
pub const VIDEO: u32 = 0x1000;
pub const DOCUMENT: u32 = 0x2000;
pub const FORWARD_TOGETHER: u32 = 0x4000;

/// Flags that mark a message as carrying a media attachment.
pub const MEDIA: u32 = IMAGE | RECORDING | AUDIO | VIDEO | DOCUMENT;

/// True when every bit of `flag` is set in `content_type`.
pub fn has(content_type: u32, flag: u32) -> bool {
    flag != 0 && content_type & flag == flag
}

/// True when `content_type` carries any media flag.
pub fn is_media(content_type: u32) -> bool {
    content_type & MEDIA != 0
}

/// Names of the flags set in `content_type`, lowest bit first.
pub fn names(content_type: u32) -> Vec<&'static str> {
    const NAMED: [(u32, &str); 11] = [
        (TEXT, "TEXT"),
        (EMOJI, "EMOJI"),
        (SCREENSHOT, "SCREENSHOT"),
        (AT, "AT"),
        (QUOTE, "QUOTE"),
        (IMAGE, "IMAGE"),
        (RECORDING, "RECORDING"),
        (AUDIO, "AUDIO"),
        (VIDEO, "VIDEO"),
        (DOCUMENT, "DOCUMENT"),
        (FORWARD_TOGETHER, "FORWARD_TOGETHER"),
    ];
    NAMED
        .iter()
        .filter(|(flag, _)| has(content_type, *flag))
        .map(|(_, name)| *name)
        .collect()
}
