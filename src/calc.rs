use serde::{Deserialize, Serialize};

pub const INTERNAL_MARK_CAP: i64 = 80;
pub const UNIT_EXTERNAL_CAP: i64 = 80;
pub const SESSION_EXTERNAL_CAP: i64 = 60;
pub const PASS_MARK: i64 = 28;

const SEED_RADIX: u32 = 36;
const MAX_CHUNK_MULTIPLIER: u32 = u32::MAX / 36;
const BASE_MULTIPLIER: f64 = 2.5;
const MULTIPLIER_STEP: f64 = 0.3;
const DEFAULT_OFFSET: i64 = 10;

/// The two subject groups of a result sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectGroup {
    /// Regular theory subjects assessed by unit tests.
    Unit,
    /// Practical/lab subjects assessed by sessional marks.
    Session,
}

impl SubjectGroup {
    pub fn credits(self) -> f64 {
        match self {
            SubjectGroup::Unit => 2.5,
            SubjectGroup::Session => 1.0,
        }
    }

    pub fn external_cap(self) -> i64 {
        match self {
            SubjectGroup::Unit => UNIT_EXTERNAL_CAP,
            SubjectGroup::Session => SESSION_EXTERNAL_CAP,
        }
    }
}

/// Averaging and numbering scheme selected by the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheme {
    pub tests_per_subject: usize,
    pub unit_base_code: i64,
}

impl Scheme {
    pub const THREE_TEST: Scheme = Scheme {
        tests_per_subject: 3,
        unit_base_code: 101,
    };
    pub const TWO_TEST: Scheme = Scheme {
        tests_per_subject: 2,
        unit_base_code: 401,
    };

    /// Identifiers starting with "24" use three unit tests and the 101 series;
    /// anything else, including empty or malformed identifiers, falls back to
    /// two tests and the 401 series.
    pub fn for_identifier(identifier: &str) -> Scheme {
        if identifier.starts_with("24") {
            Scheme::THREE_TEST
        } else {
            Scheme::TWO_TEST
        }
    }
}

/// `Int(x + 0.5)` rounding. Matches round-half-up for every value and
/// round-half-away-from-zero for the non-negative means we average.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Deterministic pseudo-random value in `[0, 1)` derived from `seed`.
pub fn seeded_unit(seed: f64) -> f64 {
    let x = seed.sin() * 10000.0;
    let frac = x - x.floor();
    // A tiny negative `x` can round up to exactly 1.0.
    if frac.is_finite() && frac < 1.0 {
        frac
    } else {
        0.0
    }
}

/// Reads the leading base-36 integer of `text` the way a lenient
/// `parseInt(text, 36)` does: leading whitespace and one sign are accepted and
/// parsing stops at the first character that is not a base-36 digit. Text with
/// no digits yields 0.
pub fn parse_base36_prefix(text: &str) -> f64 {
    let s = text.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    // Digits are gathered into u32 chunks and folded into the f64 total one
    // chunk at a time, so seeds past 2^53 round the way `parseInt` does.
    let mut chars = digits.chars().peekable();
    let mut value = 0.0_f64;
    let mut done = false;
    while !done {
        let mut part: u32 = 0;
        let mut multiplier: u32 = 1;
        loop {
            let Some(d) = chars.peek().and_then(|c| c.to_digit(SEED_RADIX)) else {
                done = true;
                break;
            };
            let next = multiplier * SEED_RADIX;
            if next > MAX_CHUNK_MULTIPLIER {
                break;
            }
            part = part * SEED_RADIX + d;
            multiplier = next;
            chars.next();
        }
        value = value * f64::from(multiplier) + f64::from(part);
    }
    if negative {
        -value
    } else {
        value
    }
}

/// Seed for a (identifier, subject) pair: the two concatenated as text and
/// read as base 36.
pub fn subject_seed(identifier: &str, subject_code: i64) -> f64 {
    parse_base36_prefix(&format!("{identifier}{subject_code}"))
}

pub fn generate_subject_codes(start: i64, count: usize) -> Vec<i64> {
    (0..count as i64).map(|i| start + i).collect()
}

/// Averages a flat score list pairwise (0&1, 2&3, ...). A trailing unpaired
/// score is averaged with 0.
#[allow(dead_code)]
pub fn average_pairs(scores: &[i64]) -> Vec<i64> {
    scores
        .chunks(2)
        .map(|pair| {
            let test1 = pair[0];
            let test2 = pair.get(1).copied().unwrap_or(0);
            round_half_up((test1 + test2) as f64 / 2.0) as i64
        })
        .collect()
}

/// Averages each subject's score group over exactly `tests_per_subject`
/// slots. Missing slots count as 0 and slots past `tests_per_subject` are
/// ignored. Results are not capped here.
pub fn average_grouped(groups: &[Vec<i64>], tests_per_subject: usize) -> Vec<i64> {
    if tests_per_subject == 0 {
        return vec![0; groups.len()];
    }
    groups
        .iter()
        .map(|group| {
            let sum: i64 = (0..tests_per_subject)
                .map(|slot| group.get(slot).copied().unwrap_or(0))
                .sum();
            round_half_up(sum as f64 / tests_per_subject as f64) as i64
        })
        .collect()
}

pub fn cap_internal(mark: i64) -> i64 {
    mark.min(INTERNAL_MARK_CAP)
}

/// Constant added to the scaled internal mark, keyed on the exact subject code.
pub fn subject_offset(subject_code: i64) -> i64 {
    match subject_code {
        402 => 5,
        403 => 13,
        404 => 2,
        405 => 5,
        _ => DEFAULT_OFFSET,
    }
}

pub fn subject_multiplier(subject_code: i64) -> f64 {
    BASE_MULTIPLIER + (subject_code % 10) as f64 * MULTIPLIER_STEP
}

/// Integer adjustment in `[-6, 6]` for a (identifier, subject) pair.
pub fn random_adjustment(identifier: &str, subject_code: i64) -> i64 {
    let unit = seeded_unit(subject_seed(identifier, subject_code));
    (unit * 13.0).floor() as i64 - 6
}

/// Synthesizes the external mark for one subject. Pure: the same inputs always
/// produce the same mark, which is capped at 60 for session subjects and 80
/// for unit subjects.
pub fn synthesize_external(
    internal: i64,
    identifier: &str,
    subject_code: i64,
    group: SubjectGroup,
) -> i64 {
    let raw = subject_multiplier(subject_code) * internal as f64
        + subject_offset(subject_code) as f64
        + random_adjustment(identifier, subject_code) as f64;
    let raw = round_half_up(raw) as i64;
    raw.clamp(0, group.external_cap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "P")]
    Pass,
    #[serde(rename = "F")]
    Fail,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "P",
            Status::Fail => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeDetails {
    pub grade_points: i64,
    pub grade: Grade,
    pub status: Status,
}

/// Grade bands, checked top-down.
const GRADE_BANDS: [(i64, i64, Grade); 6] = [
    (90, 10, Grade::APlus),
    (80, 9, Grade::A),
    (70, 8, Grade::BPlus),
    (60, 7, Grade::B),
    (50, 6, Grade::C),
    (28, 5, Grade::D),
];

pub fn evaluate_grade(total_marks: i64) -> GradeDetails {
    let (grade_points, grade) = GRADE_BANDS
        .iter()
        .find(|(min, _, _)| total_marks >= *min)
        .map(|(_, points, grade)| (*points, *grade))
        .unwrap_or((0, Grade::F));

    // Pass/fail is its own check, not derived from the letter.
    let status = if total_marks >= PASS_MARK {
        Status::Pass
    } else {
        Status::Fail
    };

    GradeDetails {
        grade_points,
        grade,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_unit_is_deterministic_and_in_range() {
        for seed in [0.0, 1.0, 42.0, 123456.0, 3.6e15, -77.0] {
            let a = seeded_unit(seed);
            let b = seeded_unit(seed);
            assert_eq!(a, b);
            assert!((0.0..1.0).contains(&a), "seed {seed} gave {a}");
        }
        assert_eq!(seeded_unit(0.0), 0.0);
    }

    #[test]
    fn seeded_unit_matches_reference_formula() {
        let x = 1.0_f64.sin() * 10000.0;
        assert_eq!(seeded_unit(1.0), x - x.floor());
    }

    #[test]
    fn base36_prefix_parsing() {
        assert_eq!(parse_base36_prefix("z"), 35.0);
        assert_eq!(parse_base36_prefix("10"), 36.0);
        assert_eq!(parse_base36_prefix("A"), parse_base36_prefix("a"));
        assert_eq!(parse_base36_prefix("  -1"), -1.0);
        assert_eq!(parse_base36_prefix("22001-CM-001401"), parse_base36_prefix("22001"));
        assert_eq!(parse_base36_prefix(""), 0.0);
        assert_eq!(parse_base36_prefix("--"), 0.0);
    }

    #[test]
    fn long_seeds_accumulate_in_chunks() {
        assert_eq!(subject_seed("24001cm001", 401), 1.0003253301381444e19);
        assert_eq!(subject_seed("2212345", 401), 208845039235969.0);
        assert_eq!(
            synthesize_external(0, "24001cm001", 401, SubjectGroup::Unit),
            12
        );
    }

    #[test]
    fn subject_seed_concatenates_identifier_and_code() {
        assert_eq!(subject_seed("22", 401), parse_base36_prefix("22401"));
        assert_eq!(subject_seed("", 1), 1.0);
    }

    #[test]
    fn generate_codes() {
        assert_eq!(generate_subject_codes(401, 4), vec![401, 402, 403, 404]);
        assert!(generate_subject_codes(101, 0).is_empty());
    }

    #[test]
    fn grouped_average_uses_fixed_slot_count() {
        assert_eq!(average_grouped(&[vec![70, 60], vec![80, 0]], 2), vec![65, 40]);
        // Third slot ignored under the two-test scheme.
        assert_eq!(average_grouped(&[vec![70, 60, 99]], 2), vec![65]);
        assert_eq!(average_grouped(&[vec![70, 60, 50]], 3), vec![60]);
        // Short groups pad with zeros.
        assert_eq!(average_grouped(&[vec![90]], 3), vec![30]);
        // Not capped here.
        assert_eq!(average_grouped(&[vec![100, 100]], 2), vec![100]);
    }

    #[test]
    fn grouped_average_rounds_half_up() {
        assert_eq!(average_grouped(&[vec![70, 71]], 2), vec![71]);
        assert_eq!(average_grouped(&[vec![10, 10, 11]], 3), vec![10]);
        assert_eq!(average_grouped(&[vec![10, 11, 11]], 3), vec![11]);
    }

    #[test]
    fn pair_average_treats_missing_second_as_zero() {
        assert_eq!(average_pairs(&[70, 60, 80]), vec![65, 40]);
        assert_eq!(average_pairs(&[]), Vec::<i64>::new());
        assert_eq!(average_pairs(&[1, 2]), vec![2]);
    }

    #[test]
    fn offsets_follow_closed_table() {
        assert_eq!(subject_offset(402), 5);
        assert_eq!(subject_offset(403), 13);
        assert_eq!(subject_offset(404), 2);
        assert_eq!(subject_offset(405), 5);
        assert_eq!(subject_offset(401), 10);
        assert_eq!(subject_offset(406), 10);
        assert_eq!(subject_offset(102), 10);
    }

    #[test]
    fn multiplier_grows_with_last_digit() {
        assert!((subject_multiplier(401) - 2.8).abs() < 1e-12);
        assert!((subject_multiplier(410) - 2.5).abs() < 1e-12);
        assert!((subject_multiplier(109) - 5.2).abs() < 1e-12);
    }

    #[test]
    fn adjustment_stays_in_range() {
        for pin in ["2212345", "24001-CM-010", "", "zzzzzz"] {
            for code in 101..130 {
                let adj = random_adjustment(pin, code);
                assert!((-6..=6).contains(&adj), "{pin}/{code} gave {adj}");
            }
        }
    }

    #[test]
    fn external_marks_are_deterministic_and_capped() {
        for internal in [0, 1, 5, 20, 40, 72, 80] {
            for code in [101, 105, 401, 402, 403, 404, 405, 409] {
                let unit = synthesize_external(internal, "2212345", code, SubjectGroup::Unit);
                let again = synthesize_external(internal, "2212345", code, SubjectGroup::Unit);
                assert_eq!(unit, again);
                assert!((0..=80).contains(&unit));

                let session =
                    synthesize_external(internal, "2212345", code, SubjectGroup::Session);
                assert!((0..=60).contains(&session));
            }
        }
    }

    #[test]
    fn external_mark_follows_formula() {
        let pin = "2212345";
        let adj = random_adjustment(pin, 401);
        let expected = round_half_up(2.8 * 20.0 + 10.0 + adj as f64) as i64;
        assert_eq!(synthesize_external(20, pin, 401, SubjectGroup::Unit), expected);
    }

    #[test]
    fn grade_boundaries() {
        let g = evaluate_grade(90);
        assert_eq!((g.grade_points, g.grade, g.status), (10, Grade::APlus, Status::Pass));
        let g = evaluate_grade(89);
        assert_eq!((g.grade_points, g.grade, g.status), (9, Grade::A, Status::Pass));
        let g = evaluate_grade(28);
        assert_eq!((g.grade_points, g.grade, g.status), (5, Grade::D, Status::Pass));
        let g = evaluate_grade(27);
        assert_eq!((g.grade_points, g.grade, g.status), (0, Grade::F, Status::Fail));
        assert_eq!(evaluate_grade(70).grade, Grade::BPlus);
        assert_eq!(evaluate_grade(60).grade, Grade::B);
        assert_eq!(evaluate_grade(50).grade, Grade::C);
        assert_eq!(evaluate_grade(160).grade_points, 10);
    }

    #[test]
    fn scheme_from_prefix() {
        assert_eq!(Scheme::for_identifier("24001-CM-001"), Scheme::THREE_TEST);
        assert_eq!(Scheme::for_identifier("2212345"), Scheme::TWO_TEST);
        assert_eq!(Scheme::for_identifier(""), Scheme::TWO_TEST);
        assert_eq!(Scheme::for_identifier("2"), Scheme::TWO_TEST);
    }

    #[test]
    fn grade_serializes_with_symbols() {
        assert_eq!(serde_json::to_string(&Grade::APlus).unwrap(), "\"A+\"");
        assert_eq!(serde_json::to_string(&Status::Fail).unwrap(), "\"F\"");
        assert_eq!(Grade::BPlus.as_str(), "B+");
    }
}
