use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Raw rubric numbers produced by the analysis step.
/// Maxima: skills 40, experience 35, achievements 20, presentation 5.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub skills: f64,
    pub experience: f64,
    pub achievements: f64,
    pub presentation: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordMatch {
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    /// Absent when the analysis ran without a job description.
    pub match_percentage: Option<u32>,
}

/// The root record every artifact hangs off. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: Uuid,
    /// Owner; billed for every generation against this analysis.
    pub user_id: Uuid,
    pub resume_text: String,
    pub job_description: Option<String>,
    pub score_breakdown: ScoreBreakdown,
    pub overall_score: u32,
    pub keyword_match: KeywordMatch,
    pub created_at: DateTime<Utc>,
}

/// Row shape of the `analyses` table. JSON columns hold the nested rubric data.
#[derive(Debug, Clone, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resume_text: String,
    pub job_description: Option<String>,
    pub score_breakdown: serde_json::Value,
    pub overall_score: i32,
    pub keyword_match: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AnalysisRow> for AnalysisRecord {
    type Error = serde_json::Error;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        Ok(AnalysisRecord {
            id: row.id,
            user_id: row.user_id,
            resume_text: row.resume_text,
            job_description: row.job_description,
            score_breakdown: serde_json::from_value(row.score_breakdown)?,
            overall_score: row.overall_score.clamp(0, 100) as u32,
            keyword_match: serde_json::from_value(row.keyword_match)?,
            created_at: row.created_at,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Résumé input shapes
// ────────────────────────────────────────────────────────────────────────────

/// A résumé as it arrives from upload/extraction: either plain text or the
/// structured object produced by the extractor. Normalised to text once, at the
/// boundary, so generators only ever see `AnalysisRecord::resume_text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResumeInput {
    RawText(String),
    Structured(ResumeData),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceItem>,
    #[serde(default)]
    pub education: Vec<EducationItem>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceItem {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationItem {
    pub degree: String,
    pub institution: String,
    #[serde(default)]
    pub year: Option<String>,
}

impl ResumeInput {
    /// Flattens the input into labelled plain text.
    pub fn into_text(self) -> String {
        match self {
            ResumeInput::RawText(text) => text,
            ResumeInput::Structured(data) => render_resume_data(&data),
        }
    }
}

fn render_resume_data(data: &ResumeData) -> String {
    let mut out = String::new();
    if let Some(name) = &data.name {
        out.push_str(&format!("Name: {name}\n"));
    }
    if let Some(summary) = &data.summary {
        out.push_str(&format!("\nSummary:\n{summary}\n"));
    }
    if !data.experience.is_empty() {
        out.push_str("\nExperience:\n");
        for item in &data.experience {
            match &item.duration {
                Some(d) => out.push_str(&format!("- {} at {} ({d})\n", item.title, item.company)),
                None => out.push_str(&format!("- {} at {}\n", item.title, item.company)),
            }
            for h in &item.highlights {
                out.push_str(&format!("  * {h}\n"));
            }
        }
    }
    if !data.education.is_empty() {
        out.push_str("\nEducation:\n");
        for item in &data.education {
            match &item.year {
                Some(y) => out.push_str(&format!("- {}, {} ({y})\n", item.degree, item.institution)),
                None => out.push_str(&format!("- {}, {}\n", item.degree, item.institution)),
            }
        }
    }
    if !data.skills.is_empty() {
        out.push_str(&format!("\nSkills: {}\n", data.skills.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_text_passes_through() {
        let input = ResumeInput::RawText("Jane Doe\nRust engineer".to_string());
        assert_eq!(input.into_text(), "Jane Doe\nRust engineer");
    }

    #[test]
    fn test_structured_resume_renders_sections() {
        let input = ResumeInput::Structured(ResumeData {
            name: Some("Jane Doe".to_string()),
            summary: None,
            experience: vec![ExperienceItem {
                title: "Backend Engineer".to_string(),
                company: "Acme".to_string(),
                duration: Some("2021-2024".to_string()),
                highlights: vec!["Cut p99 latency by 40%".to_string()],
            }],
            education: vec![],
            skills: vec!["Rust".to_string(), "Postgres".to_string()],
        });
        let text = input.into_text();
        assert!(text.contains("Name: Jane Doe"));
        assert!(text.contains("- Backend Engineer at Acme (2021-2024)"));
        assert!(text.contains("  * Cut p99 latency by 40%"));
        assert!(text.contains("Skills: Rust, Postgres"));
        assert!(!text.contains("Education"));
    }

    #[test]
    fn test_resume_input_tagged_deserialization() {
        let json = r#"{"kind": "raw_text", "value": "plain resume"}"#;
        let input: ResumeInput = serde_json::from_str(json).unwrap();
        assert!(matches!(input, ResumeInput::RawText(ref s) if s == "plain resume"));

        let json = r#"{"kind": "structured", "value": {"skills": ["Go"]}}"#;
        let input: ResumeInput = serde_json::from_str(json).unwrap();
        assert!(matches!(input, ResumeInput::Structured(ref d) if d.skills == vec!["Go"]));
    }

    #[test]
    fn test_analysis_row_converts_to_record() {
        let row = AnalysisRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resume_text: "resume".to_string(),
            job_description: None,
            score_breakdown: serde_json::json!({
                "skills": 30.0, "experience": 22.0, "achievements": 9.0, "presentation": 4.0
            }),
            overall_score: 67,
            keyword_match: serde_json::json!({"matched": ["rust"], "missing": [], "matchPercentage": 100}),
            created_at: Utc::now(),
        };
        let record = AnalysisRecord::try_from(row).unwrap();
        assert_eq!(record.overall_score, 67);
        assert_eq!(record.score_breakdown.skills, 30.0);
        assert_eq!(record.keyword_match.match_percentage, Some(100));
    }
}
