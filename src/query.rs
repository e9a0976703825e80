use crate::settings::SafetyPreferences;

/// Prepends a `-rating:` exclusion for every hidden safety category to
/// `base_query`. Categories keep the preference mapping's iteration order.
pub fn decorate(base_query: &str, preferences: &SafetyPreferences) -> String {
    let disabled: Vec<&str> = preferences.disabled().collect();
    if disabled.is_empty() {
        return base_query.trim().to_string();
    }
    format!("-rating:{} {}", disabled.join(","), base_query)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(entries: &[(&str, bool)]) -> SafetyPreferences {
        entries.iter().map(|(name, shown)| (*name, *shown)).collect()
    }

    #[test]
    fn nothing_hidden_returns_trimmed_query() {
        let all_shown = prefs(&[("safe", true), ("sketchy", true)]);
        assert_eq!(decorate("  foo bar ", &all_shown), "foo bar");
        assert_eq!(decorate("", &SafetyPreferences::empty()), "");
    }

    #[test]
    fn hidden_categories_join_in_mapping_order() {
        let hidden = prefs(&[("a", false), ("shown", true), ("b", false)]);
        assert_eq!(decorate("foo", &hidden), "-rating:a,b foo");

        let reversed = prefs(&[("b", false), ("a", false)]);
        assert_eq!(decorate("foo", &reversed), "-rating:b,a foo");
    }

    #[test]
    fn empty_base_query_has_no_dangling_space() {
        assert_eq!(decorate("", &prefs(&[("a", false)])), "-rating:a");
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        assert_eq!(
            decorate("tag ", &prefs(&[("unsafe", false)])),
            "-rating:unsafe tag"
        );
    }
}
