use crate::calc::Scheme;
use crate::record::ProviderData;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

/// Column holding the obtained marks in the unit-marks table.
pub const UNIT_MARK_COLUMN: usize = 6;
/// Column holding the obtained marks in the sessional-marks table.
pub const SESSION_MARK_COLUMN: usize = 5;
/// Unit score groups always carry this many slots; unused slots are 0.
pub const UNIT_SLOTS: usize = 3;

/// Raw tables as captured from the student portal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksSheet {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    /// Image `src` attribute, usually a `data:image/...;base64,` URI.
    #[serde(default)]
    pub photo_src: Option<String>,
    #[serde(default)]
    pub unit_rows: Vec<Vec<String>>,
    #[serde(default)]
    pub session_rows: Vec<Vec<String>>,
}

impl MarksSheet {
    pub fn into_provider_data(self, identifier: &str) -> ProviderData {
        let scheme = Scheme::for_identifier(identifier);
        ProviderData {
            name: non_blank(self.name),
            branch: non_blank(self.branch),
            photo_base64: self.photo_src.as_deref().and_then(normalize_photo),
            unit_scores: unit_scores_from_rows(&self.unit_rows, scheme.tests_per_subject),
            session_scores: session_scores_from_rows(&self.session_rows),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parses the leading decimal integer of a cell. Empty or non-numeric cells
/// read as 0.
pub fn parse_cell_mark(cell: &str) -> i64 {
    let s = cell.trim();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = digits[..end].parse::<i64>().unwrap_or(0);
    if negative {
        -value
    } else {
        value
    }
}

fn cell_mark(row: Option<&Vec<String>>, column: usize) -> i64 {
    row.and_then(|cells| cells.get(column))
        .map(|cell| parse_cell_mark(cell))
        .unwrap_or(0)
}

/// Regroups the unit-marks table into one score group per subject.
///
/// The table lists every subject for test 1, then every subject for test 2,
/// and so on, so subject `i` of test `t` sits at row `i + t * rows_per_test`.
/// Leftover rows that do not fill a whole test block are ignored.
pub fn unit_scores_from_rows(rows: &[Vec<String>], tests_per_subject: usize) -> Vec<Vec<i64>> {
    if tests_per_subject == 0 {
        return Vec::new();
    }
    let rows_per_test = rows.len() / tests_per_subject;
    (0..rows_per_test)
        .map(|i| {
            (0..UNIT_SLOTS)
                .map(|test| {
                    if test < tests_per_subject {
                        cell_mark(rows.get(i + test * rows_per_test), UNIT_MARK_COLUMN)
                    } else {
                        0
                    }
                })
                .collect()
        })
        .collect()
}

/// One score per sessional subject; the first row is the table header.
pub fn session_scores_from_rows(rows: &[Vec<String>]) -> Vec<i64> {
    rows.iter()
        .skip(1)
        .map(|row| cell_mark(Some(row), SESSION_MARK_COLUMN))
        .collect()
}

/// Strips a `data:image/...;base64,` prefix and checks the payload decodes.
/// Anything unusable is treated as no photo.
pub fn normalize_photo(src: &str) -> Option<String> {
    let src = src.trim();
    let payload = match src.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,")?.1,
        None => src,
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    STANDARD.decode(payload).ok()?;
    Some(payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(mark_col: usize, mark: &str) -> Vec<String> {
        let mut cells = vec![String::new(); mark_col + 1];
        cells[mark_col] = mark.to_string();
        cells
    }

    #[test]
    fn cell_parsing_is_lenient() {
        assert_eq!(parse_cell_mark(" 45 "), 45);
        assert_eq!(parse_cell_mark("45/50"), 45);
        assert_eq!(parse_cell_mark(""), 0);
        assert_eq!(parse_cell_mark("AB"), 0);
        assert_eq!(parse_cell_mark("-3"), -3);
    }

    #[test]
    fn unit_rows_are_regrouped_test_major() {
        // Two subjects, two tests: rows are [s1t1, s2t1, s1t2, s2t2].
        let rows = vec![
            row(UNIT_MARK_COLUMN, "70"),
            row(UNIT_MARK_COLUMN, "40"),
            row(UNIT_MARK_COLUMN, "74"),
            row(UNIT_MARK_COLUMN, "41"),
        ];
        assert_eq!(
            unit_scores_from_rows(&rows, 2),
            vec![vec![70, 74, 0], vec![40, 41, 0]]
        );
    }

    #[test]
    fn three_test_rows_and_leftovers() {
        let rows: Vec<Vec<String>> = ["1", "2", "3", "4", "5", "6", "7"]
            .iter()
            .map(|m| row(UNIT_MARK_COLUMN, m))
            .collect();
        assert_eq!(
            unit_scores_from_rows(&rows, 3),
            vec![vec![1, 3, 5], vec![2, 4, 6]]
        );
    }

    #[test]
    fn short_rows_read_as_zero() {
        let rows = vec![vec!["x".to_string()], row(UNIT_MARK_COLUMN, "50")];
        assert_eq!(unit_scores_from_rows(&rows, 2), vec![vec![0, 50, 0]]);
    }

    #[test]
    fn session_rows_skip_header() {
        let rows = vec![
            row(SESSION_MARK_COLUMN, "Marks"),
            row(SESSION_MARK_COLUMN, "55"),
            row(SESSION_MARK_COLUMN, ""),
        ];
        assert_eq!(session_scores_from_rows(&rows), vec![55, 0]);
        assert!(session_scores_from_rows(&[]).is_empty());
    }

    #[test]
    fn photo_prefix_is_stripped() {
        assert_eq!(
            normalize_photo("data:image/jpg;base64,aGVsbG8=").as_deref(),
            Some("aGVsbG8=")
        );
        assert_eq!(normalize_photo("aGVsbG8=").as_deref(), Some("aGVsbG8="));
        assert_eq!(normalize_photo("data:image/png;base64,"), None);
        assert_eq!(normalize_photo("not base64!!"), None);
        assert_eq!(normalize_photo("   "), None);
    }

    #[test]
    fn sheet_converts_with_identifier_scheme() {
        let sheet = MarksSheet {
            name: Some(" Asha ".to_string()),
            branch: Some("  ".to_string()),
            photo_src: None,
            unit_rows: vec![
                row(UNIT_MARK_COLUMN, "60"),
                row(UNIT_MARK_COLUMN, "70"),
                row(UNIT_MARK_COLUMN, "80"),
            ],
            session_rows: vec![row(SESSION_MARK_COLUMN, "hdr"), row(SESSION_MARK_COLUMN, "30")],
        };
        let data = sheet.into_provider_data("24001-CM-001");
        assert_eq!(data.name.as_deref(), Some("Asha"));
        assert_eq!(data.branch, None);
        assert_eq!(data.unit_scores, vec![vec![60, 70, 80]]);
        assert_eq!(data.session_scores, vec![30]);
    }
}
