use regex::Regex;

use super::Asset;

/// Sort position derived from a display name. Variant order matters:
/// numeric tokens first, then other tokens, then names the pattern misses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SequenceKey {
    Numeric(u128),
    Token(String),
    Unmatched(String),
}

#[derive(Debug, Clone)]
pub struct NamingConvention {
    pattern: Regex,
}

impl NamingConvention {
    pub fn new(pattern: &str) -> Result<Self, String> {
        let pattern = Regex::new(pattern).map_err(|err| err.to_string())?;
        if pattern.captures_len() < 2 {
            return Err(format!(
                "pattern `{pattern}` needs a capture group around the sequence token"
            ));
        }
        Ok(Self { pattern })
    }

    pub fn sequence_key(&self, display_name: &str) -> SequenceKey {
        let token = self
            .pattern
            .captures(display_name)
            .and_then(|captures| captures.get(1))
            .map(|group| group.as_str().trim());

        match token {
            Some(token) if !token.is_empty() => match token.parse::<u128>() {
                Ok(number) => SequenceKey::Numeric(number),
                Err(_) => SequenceKey::Token(token.to_string()),
            },
            _ => SequenceKey::Unmatched(display_name.to_string()),
        }
    }

    /// Stable total order: sequence key, then identifier.
    pub fn sort(&self, assets: &mut [Asset]) {
        assets.sort_by_cached_key(|asset| {
            (
                self.sequence_key(&asset.display_name),
                asset.identifier.clone(),
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::LinkSource;
    use super::*;

    fn asset(id: &str, name: &str) -> Asset {
        Asset {
            identifier: id.to_string(),
            display_name: name.to_string(),
            download_url: format!("https://cdn.test/{id}.mp4"),
            link_source: LinkSource::Files,
            quality: None,
            size_bytes: None,
            duration_secs: None,
        }
    }

    fn names(assets: &[Asset]) -> Vec<&str> {
        assets.iter().map(|a| a.display_name.as_str()).collect()
    }

    #[test]
    fn numeric_tokens_sort_numerically_not_lexically() {
        let naming = NamingConvention::new(r"BL_(\d+)").expect("pattern");
        let mut assets = vec![
            asset("1", "BLACKLIVES_BL_010"),
            asset("2", "BLACKLIVES_BL_9"),
            asset("3", "BLACKLIVES_BL_100"),
        ];
        naming.sort(&mut assets);
        assert_eq!(
            names(&assets),
            vec!["BLACKLIVES_BL_9", "BLACKLIVES_BL_010", "BLACKLIVES_BL_100"]
        );
    }

    #[test]
    fn unmatched_names_go_last_in_name_order() {
        let naming = NamingConvention::new(r"BL_(\d+)").expect("pattern");
        let mut assets = vec![
            asset("1", "zeta promo"),
            asset("2", "BLACKLIVES_BL_002"),
            asset("3", "alpha promo"),
        ];
        naming.sort(&mut assets);
        assert_eq!(
            names(&assets),
            vec!["BLACKLIVES_BL_002", "alpha promo", "zeta promo"]
        );
    }

    #[test]
    fn colliding_names_fall_back_to_identifier() {
        let naming = NamingConvention::new(r"BL_(\d+)").expect("pattern");
        let mut first = vec![asset("b", "BL_001"), asset("a", "BL_1")];
        let mut second = vec![asset("a", "BL_1"), asset("b", "BL_001")];
        naming.sort(&mut first);
        naming.sort(&mut second);
        assert_eq!(first, second);
        assert_eq!(first[0].identifier, "a");
    }

    #[test]
    fn non_numeric_tokens_sort_after_numeric_ones() {
        let naming = NamingConvention::new(r"EP-(\w+)").expect("pattern");
        assert!(naming.sequence_key("EP-12") < naming.sequence_key("EP-b"));
        assert!(naming.sequence_key("EP-a") < naming.sequence_key("EP-b"));
        assert!(naming.sequence_key("EP-b") < naming.sequence_key("trailer"));
    }

    #[test]
    fn pattern_without_group_is_rejected() {
        assert!(NamingConvention::new(r"BL_\d+").is_err());
        assert!(NamingConvention::new(r"BL_(\d+").is_err());
    }
}
