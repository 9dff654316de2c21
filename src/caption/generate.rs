//! Caption generation parameters.

use crate::config::CaptionConfig;

/// Decoding parameters for a single caption request.
///
/// `beam_width == 1` selects greedy decoding; anything larger runs beam
/// search with that many hypotheses.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    /// Maximum caption length in tokens, including the start token.
    pub max_length: usize,
    /// Number of beam-search hypotheses.
    pub beam_width: usize,
    /// Seed for the logits processor (greedy decoding ignores it).
    pub seed: u64,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            max_length: 50,
            beam_width: 4,
            seed: 299_792_458,
        }
    }
}

impl GenerateParams {
    /// Build params from the persisted configuration, clamping degenerate
    /// values so decoding always makes progress.
    pub fn from_config(config: &CaptionConfig) -> Self {
        Self {
            max_length: config.max_length.max(1),
            beam_width: config.beam_width.max(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let params = GenerateParams::default();
        assert_eq!(params.max_length, 50);
        assert_eq!(params.beam_width, 4);
    }

    #[test]
    fn from_config_clamps_zero_values() {
        let config = CaptionConfig {
            max_length: 0,
            beam_width: 0,
            ..CaptionConfig::default()
        };
        let params = GenerateParams::from_config(&config);
        assert_eq!(params.max_length, 1);
        assert_eq!(params.beam_width, 1);
    }

    #[test]
    fn from_config_keeps_configured_values() {
        let config = CaptionConfig {
            max_length: 30,
            beam_width: 2,
            ..CaptionConfig::default()
        };
        let params = GenerateParams::from_config(&config);
        assert_eq!(params.max_length, 30);
        assert_eq!(params.beam_width, 2);
    }
}
