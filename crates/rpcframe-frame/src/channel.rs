//! Stream id conventions.
//!
//! Stream id 0 is reserved for the textual channel (TEXT frames).
//! Every other id names a raw byte stream (CHUNK, END, ERROR frames).

/// The id carried by every TEXT frame.
pub const TEXT_STREAM_ID: u32 = 0;

/// Returns true if the id names a raw byte stream.
pub fn is_raw_stream(id: u32) -> bool {
    id != TEXT_STREAM_ID
}

/// Returns a human-readable name for a stream id.
pub fn stream_name(id: u32) -> &'static str {
    match id {
        TEXT_STREAM_ID => "TEXT",
        _ => "RAW",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_the_text_stream() {
        assert!(!is_raw_stream(0));
        assert_eq!(stream_name(0), "TEXT");
    }

    #[test]
    fn nonzero_ids_are_raw() {
        assert!(is_raw_stream(1));
        assert!(is_raw_stream(u32::MAX));
        assert_eq!(stream_name(42), "RAW");
    }
}
