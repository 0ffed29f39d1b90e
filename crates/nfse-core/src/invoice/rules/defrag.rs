//! Whitespace defragmentation for broken PDF text streams.

/// Remove every whitespace character.
///
/// Lossy for free text; only the deterministic miner consumes the result.
pub fn defragment(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defragment_glyph_runs() {
        assert_eq!(
            defragment("Insc Municipal 12.345.678/0001-90 ... Número da NFS-e 42"),
            "InscMunicipal12.345.678/0001-90...NúmerodaNFS-e42"
        );
    }

    #[test]
    fn test_defragment_all_whitespace_kinds() {
        assert_eq!(defragment("a\tb\nc\u{00a0}d\r\n e"), "abcde");
        assert_eq!(defragment(""), "");
    }

    #[test]
    fn test_defragment_is_idempotent() {
        for input in ["", "  ", "a b  c", "Número\tda\nNFS-e 42", "\u{2003}x\u{00a0}y"] {
            let once = defragment(input);
            assert_eq!(defragment(&once), once);
        }
    }
}
