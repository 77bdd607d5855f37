//! HPC event descriptors from the `COUNTERS` file
//!
//! One descriptor per line. Blank lines are ignored and `#` starts a comment.
//! The first whitespace-separated word is the symbolic event name; the rest
//! of the line is passed through as the probe library's event selector.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// One line of the `COUNTERS` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDescriptor {
    /// Symbolic event name (e.g. `PAPI_L1_DCM`)
    pub name: String,
    /// Remaining selector text, possibly empty
    pub selector: String,
}

/// Parse descriptor text
pub fn parse_counters(content: &str) -> Vec<CounterDescriptor> {
    content
        .lines()
        .filter_map(|line| {
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            };
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (name, selector) = match line.split_once(char::is_whitespace) {
                Some((name, rest)) => (name, rest.trim()),
                None => (line, ""),
            };
            Some(CounterDescriptor {
                name: name.to_string(),
                selector: selector.to_string(),
            })
        })
        .collect()
}

/// Load and parse a `COUNTERS` file
pub fn load_counters(path: &Path) -> Result<Vec<CounterDescriptor>> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(parse_counters(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_and_blanks_ignored() {
        let text = "# events\n\nPAPI_TOT_CYC\n  PAPI_L1_DCM   raw=0x40 # l1 misses\n#PAPI_BR_MSP\n";
        let counters = parse_counters(text);
        assert_eq!(counters.len(), 2);
        assert_eq!(counters[0].name, "PAPI_TOT_CYC");
        assert_eq!(counters[0].selector, "");
        assert_eq!(counters[1].name, "PAPI_L1_DCM");
        assert_eq!(counters[1].selector, "raw=0x40");
    }

    #[test]
    fn test_empty_file_has_no_events() {
        assert!(parse_counters("").is_empty());
        assert!(parse_counters("# nothing\n   \n").is_empty());
    }
}
