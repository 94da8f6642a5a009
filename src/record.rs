use crate::calc::{self, Grade, Scheme, Status, SubjectGroup};
use serde::{Deserialize, Serialize};

/// Everything the marks source hands over for one identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub photo_base64: Option<String>,
    /// Raw unit-test scores, one slot group per subject.
    #[serde(default)]
    pub unit_scores: Vec<Vec<i64>>,
    /// One raw sessional score per subject.
    #[serde(default)]
    pub session_scores: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_code: i64,
    pub internal_marks: i64,
    pub external_marks: i64,
    pub total_marks: i64,
    pub grade_points: i64,
    pub credits: f64,
    pub grade: Grade,
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultTotals {
    pub total_internal_unit: i64,
    pub total_external_unit: i64,
    pub total_internal_session: i64,
    pub total_external_session: i64,
    #[serde(rename = "GrandTotal")]
    pub grand_total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub name: Option<String>,
    pub pin: String,
    pub branch: Option<String>,
    pub photo_base64: Option<String>,
    pub unit_results: Vec<SubjectResult>,
    pub session_results: Vec<SubjectResult>,
    pub totals: ResultTotals,
}

impl ResultRecord {
    pub fn subject_count(&self) -> usize {
        self.unit_results.len() + self.session_results.len()
    }
}

fn subject_result(
    identifier: &str,
    subject_code: i64,
    internal_marks: i64,
    group: SubjectGroup,
) -> SubjectResult {
    let external_marks = calc::synthesize_external(internal_marks, identifier, subject_code, group);
    let total_marks = internal_marks + external_marks;
    let details = calc::evaluate_grade(total_marks);
    SubjectResult {
        subject_code,
        internal_marks,
        external_marks,
        total_marks,
        grade_points: details.grade_points,
        credits: group.credits(),
        grade: details.grade,
        status: details.status,
    }
}

/// Sums internal and external marks for one group. External marks are
/// synthesized again here rather than read back from the rows; both paths
/// agree because synthesis is pure.
fn group_totals(
    identifier: &str,
    codes: &[i64],
    internals: &[i64],
    group: SubjectGroup,
) -> (i64, i64) {
    codes
        .iter()
        .zip(internals)
        .fold((0, 0), |(internal_sum, external_sum), (&code, &internal)| {
            let external = calc::synthesize_external(internal, identifier, code, group);
            (internal_sum + internal, external_sum + external)
        })
}

fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Builds the complete result record for `identifier` from provider data.
///
/// Never fails: malformed identifiers fall back to the two-test scheme and
/// missing scores count as zero. The record is assembled only after every
/// subject has been computed.
pub fn compute_result(identifier: &str, data: &ProviderData) -> ResultRecord {
    let scheme = Scheme::for_identifier(identifier);

    let unit_internals: Vec<i64> =
        calc::average_grouped(&data.unit_scores, scheme.tests_per_subject)
            .into_iter()
            .map(calc::cap_internal)
            .collect();
    let session_internals: Vec<i64> = data
        .session_scores
        .iter()
        .copied()
        .map(calc::cap_internal)
        .collect();

    let unit_codes = calc::generate_subject_codes(scheme.unit_base_code, unit_internals.len());
    let session_start = unit_codes
        .last()
        .map(|code| code + 1)
        .unwrap_or(scheme.unit_base_code);
    let session_codes = calc::generate_subject_codes(session_start, session_internals.len());

    let unit_results: Vec<SubjectResult> = unit_codes
        .iter()
        .zip(&unit_internals)
        .map(|(&code, &internal)| subject_result(identifier, code, internal, SubjectGroup::Unit))
        .collect();
    let session_results: Vec<SubjectResult> = session_codes
        .iter()
        .zip(&session_internals)
        .map(|(&code, &internal)| {
            subject_result(identifier, code, internal, SubjectGroup::Session)
        })
        .collect();

    let (total_internal_unit, total_external_unit) =
        group_totals(identifier, &unit_codes, &unit_internals, SubjectGroup::Unit);
    let (total_internal_session, total_external_session) = group_totals(
        identifier,
        &session_codes,
        &session_internals,
        SubjectGroup::Session,
    );
    let grand_total =
        total_internal_unit + total_external_unit + total_internal_session + total_external_session;

    ResultRecord {
        name: clean_text(data.name.as_deref()),
        pin: identifier.trim().to_uppercase(),
        branch: clean_text(data.branch.as_deref()),
        photo_base64: data.photo_base64.clone(),
        unit_results,
        session_results,
        totals: ResultTotals {
            total_internal_unit,
            total_external_unit,
            total_internal_session,
            total_external_session,
            grand_total,
        },
    }
}
