use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

/// Engine-wide configuration. Built once, validated once, and passed by
/// reference (or cheap clone) into every component constructor.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// Relative numbering recomputes a heading's logical nesting level from
    /// the prior heading sequence; absolute numbering trusts the raw `#`
    /// count.
    pub numbering_mode: NumberingMode,
    /// Number of tag components, including the trailing item counter.
    /// Headings deeper than `max_depth - 1` clamp to the deepest slot.
    pub max_depth: usize,
    /// Joins hierarchical tag components (`1.2.3`).
    pub delimiter: String,
    /// Prepended to every generated tag.
    pub global_prefix: String,
    /// Prefix for items that appear before the first heading.
    pub no_heading_prefix: String,
    /// Prefix that marks a `\ref{...}` component as a citation of ours.
    pub citation_prefix: String,
    /// Image metadata segment prefix that carries the figure tag.
    pub figure_prefix: String,
    /// Callout header prefixes, matched longest-first then in declaration
    /// order.
    pub callout_prefixes: Vec<String>,
    /// Continuous-range symbol (`1.1~3`).
    pub range_symbol: String,
    /// Separates a footnote index from a local tag in cross-file citations
    /// (`3^1.2`).
    pub file_delimiter: String,
    /// Characters treated as numeric component separators when compressing
    /// tag ranges.
    pub numeric_delimiters: String,
    /// Cache entries older than this many seconds are re-parsed on read.
    pub cache_update_seconds: u64,
    /// Sweep interval; entries untouched for this long are evicted.
    pub cache_clean_seconds: u64,
    /// Hard cap on cached files per entity kind; the oldest half is evicted
    /// when exceeded.
    pub max_cache_size: usize,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum NumberingMode {
    Relative,
    Absolute,
}

impl Settings {
    /// Loads settings from `~/.config/citator/settings` and
    /// `<root>/.citator`, later sources winning, then validates the result.
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/citator/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.citator",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("numbering_mode", "Relative")?
            .set_default("max_depth", 3)?
            .set_default("delimiter", ".")?
            .set_default("global_prefix", "")?
            .set_default("no_heading_prefix", "0.")?
            .set_default("citation_prefix", "eq:")?
            .set_default("figure_prefix", "fig:")?
            .set_default(
                "callout_prefixes",
                vec!["thm:", "def:", "lem:", "tbl:"],
            )?
            .set_default("range_symbol", "~")?
            .set_default("file_delimiter", "^")?
            .set_default("numeric_delimiters", "._-")?
            .set_default("cache_update_seconds", 5)?
            .set_default("cache_clean_seconds", 60)?
            .set_default("max_cache_size", 30)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;
        settings.validate()?;

        anyhow::Ok(settings)
    }

    /// Construction-time sanity checks. Callers get a configuration that is
    /// either usable everywhere or rejected here, never half-valid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_depth == 0 {
            return Err(anyhow!("max_depth must be at least 1"));
        }
        if self.delimiter.is_empty() {
            return Err(anyhow!("delimiter must not be empty"));
        }
        if self.range_symbol.is_empty() || self.file_delimiter.is_empty() {
            return Err(anyhow!("range_symbol and file_delimiter must not be empty"));
        }
        if self.range_symbol == self.file_delimiter {
            return Err(anyhow!(
                "range_symbol and file_delimiter must differ, both are `{}`",
                self.range_symbol
            ));
        }
        if self.callout_prefixes.iter().any(|p| p.is_empty()) {
            return Err(anyhow!("callout_prefixes must not contain empty entries"));
        }
        Ok(())
    }

    /// Callout prefixes in match order: longest first, declaration order
    /// breaking ties.
    pub fn callout_prefixes_by_length(&self) -> Vec<&str> {
        let mut indexed: Vec<(usize, &str)> = self
            .callout_prefixes
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.as_str()))
            .collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.len().cmp(&a.len()).then(ia.cmp(ib)));
        indexed.into_iter().map(|(_, p)| p).collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            numbering_mode: NumberingMode::Relative,
            max_depth: 3,
            delimiter: ".".to_string(),
            global_prefix: "".to_string(),
            no_heading_prefix: "0.".to_string(),
            citation_prefix: "eq:".to_string(),
            figure_prefix: "fig:".to_string(),
            callout_prefixes: vec![
                "thm:".to_string(),
                "def:".to_string(),
                "lem:".to_string(),
                "tbl:".to_string(),
            ],
            range_symbol: "~".to_string(),
            file_delimiter: "^".to_string(),
            numeric_delimiters: "._-".to_string(),
            cache_update_seconds: 5,
            cache_clean_seconds: 60,
            max_cache_size: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_zero_max_depth_rejected() {
        let settings = Settings {
            max_depth: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_clashing_delimiters_rejected() {
        let settings = Settings {
            range_symbol: "^".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    /// Test: prefixes come back longest-first, declaration order on ties.
    #[test]
    fn test_callout_prefix_order() {
        let settings = Settings {
            callout_prefixes: vec![
                "th:".to_string(),
                "theorem:".to_string(),
                "de:".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            settings.callout_prefixes_by_length(),
            vec!["theorem:", "th:", "de:"]
        );
    }
}
