//! Format-specific parsers
//!
//! Each supported format has a parser module that implements
//! the [`GcLogParser`](super::GcLogParser) trait.
//!
//! ## Supported Formats
//!
//! | Collector | Legacy | Unified |
//! |-----------|--------|---------|
//! | Serial | [`legacy_generational`] | [`unified_generational`] |
//! | Parallel | [`legacy_generational`] | [`unified_generational`] |
//! | CMS | [`legacy_generational`] | [`unified_generational`] |
//! | G1 | [`legacy_g1`] | [`unified_g1`] |
//! | ZGC | - | [`unified_zgc`] |

mod common;
mod legacy_g1;
mod legacy_generational;
mod unified_g1;
mod unified_generational;
mod unified_zgc;

pub use legacy_g1::LegacyG1Parser;
pub use legacy_generational::LegacyGenerationalParser;
pub use unified_g1::UnifiedG1Parser;
pub use unified_generational::UnifiedGenerationalParser;
pub use unified_zgc::UnifiedZgcParser;

use super::GcLogParser;
use crate::error::{Error, Result};
use crate::model::{CollectorFamily, LogFormat, LogStyle};

/// Get the parser for a format.
///
/// Fails with [`Error::UnsupportedFormat`] when no parser handles it.
pub fn parser_for(format: LogFormat) -> Result<Box<dyn GcLogParser>> {
    use CollectorFamily::*;
    match (format.family, format.style) {
        (Serial | Parallel | Cms, LogStyle::Legacy) => {
            Ok(Box::new(LegacyGenerationalParser::new(format.family)))
        }
        (Serial | Parallel | Cms, LogStyle::Unified) => {
            Ok(Box::new(UnifiedGenerationalParser::new(format.family)))
        }
        (G1, LogStyle::Legacy) => Ok(Box::new(LegacyG1Parser::new())),
        (G1, LogStyle::Unified) => Ok(Box::new(UnifiedG1Parser::new())),
        (Zgc, LogStyle::Unified) => Ok(Box::new(UnifiedZgcParser::new())),
        (Zgc, LogStyle::Legacy) | (Shenandoah | Epsilon, _) => Err(Error::UnsupportedFormat(
            format!("no parser for {format} logs"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_for_each_supported_format() {
        use CollectorFamily::*;
        let supported = [
            (Serial, LogStyle::Legacy),
            (Serial, LogStyle::Unified),
            (Parallel, LogStyle::Legacy),
            (Parallel, LogStyle::Unified),
            (Cms, LogStyle::Legacy),
            (Cms, LogStyle::Unified),
            (G1, LogStyle::Legacy),
            (G1, LogStyle::Unified),
            (Zgc, LogStyle::Unified),
        ];
        for (family, style) in supported {
            let format = LogFormat::new(family, style);
            assert_eq!(parser_for(format).unwrap().format(), format);
        }
    }

    #[test]
    fn test_parser_for_unsupported() {
        for format in [
            LogFormat::new(CollectorFamily::Zgc, LogStyle::Legacy),
            LogFormat::new(CollectorFamily::Shenandoah, LogStyle::Unified),
            LogFormat::new(CollectorFamily::Epsilon, LogStyle::Legacy),
        ] {
            assert!(matches!(
                parser_for(format),
                Err(Error::UnsupportedFormat(_))
            ));
        }
    }
}
