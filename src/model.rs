//! Subjects, exams, study sessions and lessons.
//!
//! References between kinds (`subjectId`, `examId`) are soft: they are never
//! checked against the referenced store, and readers tolerate dangling ids.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::Entity;
use crate::time::parse_iso;
use crate::{Error, Result};

/// The record kinds served under `/api/{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Subjects,
    Exams,
    StudySessions,
    Lessons,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Subjects, Kind::Exams, Kind::StudySessions, Kind::Lessons];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Subjects => Subject::INDEX_NAME,
            Kind::Exams => Exam::INDEX_NAME,
            Kind::StudySessions => StudySession::INDEX_NAME,
            Kind::Lessons => Lesson::INDEX_NAME,
        }
    }

    /// Singular name used in messages, e.g. `study session`.
    pub fn entity_name(&self) -> &'static str {
        match self {
            Kind::Subjects => Subject::ENTITY_NAME,
            Kind::Exams => Exam::ENTITY_NAME,
            Kind::StudySessions => StudySession::ENTITY_NAME,
            Kind::Lessons => Lesson::ENTITY_NAME,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::NotFound(format!("unknown kind: {}", s)))
    }
}

/// A record that can be built from request fields.
///
/// `Fields` is the loosely typed shape accepted on create and update; only
/// presence is checked here, value rules live in [`Entity::validate`].
pub trait Record: Entity {
    type Fields: DeserializeOwned + Send;

    fn from_fields(id: String, fields: Self::Fields) -> Result<Self>;

    fn into_patch(fields: Self::Fields) -> Result<Self::Patch>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub subject_id: String,
    pub title: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub exam_id: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub subject_id: String,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySessionFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

/// Lessons stay attached to the subject they were created under.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

fn require(value: Option<String>, message: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Validation(message.to_string())),
    }
}

fn non_blank(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn iso_date(value: &str, field: &str) -> Result<()> {
    parse_iso(value)
        .map(|_| ())
        .ok_or_else(|| Error::Validation(format!("{} must be an ISO-8601 date", field)))
}

/// `#rgb` or `#rrggbb`.
pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

impl Entity for Subject {
    const ENTITY_NAME: &'static str = "subject";
    const INDEX_NAME: &'static str = "subjects";
    type Patch = SubjectFields;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        non_blank(&self.name, "name")?;
        if !is_hex_color(&self.color) {
            return Err(Error::Validation("color must be a hex color like #ff0000".to_string()));
        }
        Ok(())
    }
}

impl Record for Subject {
    type Fields = SubjectFields;

    fn from_fields(id: String, fields: SubjectFields) -> Result<Self> {
        const MESSAGE: &str = "name and color are required";
        Ok(Subject {
            id,
            name: require(fields.name, MESSAGE)?,
            color: require(fields.color, MESSAGE)?,
        })
    }

    fn into_patch(fields: SubjectFields) -> Result<SubjectFields> {
        if fields.name.is_none() && fields.color.is_none() {
            return Err(Error::Validation("name or color must be provided".to_string()));
        }
        Ok(fields)
    }
}

impl Entity for Exam {
    const ENTITY_NAME: &'static str = "exam";
    const INDEX_NAME: &'static str = "exams";
    type Patch = ExamFields;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        non_blank(&self.title, "title")?;
        non_blank(&self.subject_id, "subjectId")?;
        iso_date(&self.date, "date")
    }
}

impl Record for Exam {
    type Fields = ExamFields;

    fn from_fields(id: String, fields: ExamFields) -> Result<Self> {
        const MESSAGE: &str = "title, subjectId, and date are required";
        Ok(Exam {
            id,
            title: require(fields.title, MESSAGE)?,
            subject_id: require(fields.subject_id, MESSAGE)?,
            date: require(fields.date, MESSAGE)?,
        })
    }

    fn into_patch(fields: ExamFields) -> Result<ExamFields> {
        Ok(fields)
    }
}

impl Entity for StudySession {
    const ENTITY_NAME: &'static str = "study session";
    const INDEX_NAME: &'static str = "studysessions";
    type Patch = StudySessionFields;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        non_blank(&self.title, "title")?;
        non_blank(&self.exam_id, "examId")?;
        let start = parse_iso(&self.start_time)
            .ok_or_else(|| Error::Validation("startTime must be an ISO-8601 date".to_string()))?;
        let end = parse_iso(&self.end_time)
            .ok_or_else(|| Error::Validation("endTime must be an ISO-8601 date".to_string()))?;
        if end < start {
            return Err(Error::Validation("endTime must not be before startTime".to_string()));
        }
        Ok(())
    }
}

impl Record for StudySession {
    type Fields = StudySessionFields;

    fn from_fields(id: String, fields: StudySessionFields) -> Result<Self> {
        const MESSAGE: &str = "title, examId, startTime, and endTime are required";
        Ok(StudySession {
            id,
            title: require(fields.title, MESSAGE)?,
            exam_id: require(fields.exam_id, MESSAGE)?,
            start_time: require(fields.start_time, MESSAGE)?,
            end_time: require(fields.end_time, MESSAGE)?,
        })
    }

    fn into_patch(fields: StudySessionFields) -> Result<StudySessionFields> {
        Ok(fields)
    }
}

impl Entity for Lesson {
    const ENTITY_NAME: &'static str = "lesson";
    const INDEX_NAME: &'static str = "lessons";
    type Patch = LessonPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        non_blank(&self.title, "title")?;
        non_blank(&self.subject_id, "subjectId")?;
        iso_date(&self.due_date, "dueDate")
    }
}

impl Record for Lesson {
    type Fields = LessonFields;

    fn from_fields(id: String, fields: LessonFields) -> Result<Self> {
        const MESSAGE: &str = "title, subjectId, and dueDate are required";
        Ok(Lesson {
            id,
            title: require(fields.title, MESSAGE)?,
            subject_id: require(fields.subject_id, MESSAGE)?,
            due_date: require(fields.due_date, MESSAGE)?,
            description: fields.description.unwrap_or_default(),
            is_complete: false,
        })
    }

    fn into_patch(fields: LessonFields) -> Result<LessonPatch> {
        Ok(LessonPatch {
            title: fields.title,
            description: fields.description,
            due_date: fields.due_date,
            is_complete: fields.is_complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_round_trips_through_url_segment() {
        for kind in Kind::ALL {
            assert_eq!(kind.as_str().parse::<Kind>().unwrap(), kind);
        }
        assert_eq!(serde_json::to_value(Kind::StudySessions).unwrap(), json!("studysessions"));
        assert!(matches!("users".parse::<Kind>(), Err(Error::NotFound(_))));
    }

    #[test]
    fn records_use_camel_case() {
        let lesson = Lesson {
            id: "l1".into(),
            subject_id: "s1".into(),
            title: "Limits".into(),
            description: String::new(),
            due_date: "2024-05-01".into(),
            is_complete: false,
        };
        let value = serde_json::to_value(&lesson).unwrap();
        assert_eq!(value["subjectId"], json!("s1"));
        assert_eq!(value["dueDate"], json!("2024-05-01"));
        assert_eq!(value["isComplete"], json!(false));
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#ff0000"));
        assert!(is_hex_color("#ABC"));
        assert!(!is_hex_color("ff0000"));
        assert!(!is_hex_color("#ff00"));
        assert!(!is_hex_color("#gg0000"));
    }

    #[test]
    fn subject_requires_name_and_color() {
        let err = Subject::from_fields("s1".into(), SubjectFields { name: Some("Math".into()), color: None });
        assert!(matches!(err, Err(Error::Validation(m)) if m == "name and color are required"));

        let subject = Subject::from_fields(
            "s1".into(),
            SubjectFields { name: Some("Math".into()), color: Some("#ff0000".into()) },
        )
        .unwrap();
        assert!(subject.validate().is_ok());
        assert!(matches!(Subject::into_patch(SubjectFields::default()), Err(Error::Validation(_))));
    }

    #[test]
    fn subject_rejects_bad_color() {
        let subject = Subject { id: "s1".into(), name: "Math".into(), color: "red".into() };
        assert!(matches!(subject.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn exam_requires_parseable_date() {
        let fields: ExamFields =
            serde_json::from_value(json!({"title": "Midterm", "subjectId": "s1", "date": "soon"})).unwrap();
        let exam = Exam::from_fields("e1".into(), fields).unwrap();
        assert!(matches!(exam.validate(), Err(Error::Validation(_))));

        let fields: ExamFields = serde_json::from_value(json!({"title": "Midterm"})).unwrap();
        assert!(matches!(Exam::from_fields("e1".into(), fields), Err(Error::Validation(_))));
    }

    #[test]
    fn session_end_must_follow_start() {
        let session = StudySession {
            id: "ss1".into(),
            exam_id: "e1".into(),
            title: "Review".into(),
            start_time: "2024-05-01T10:00:00Z".into(),
            end_time: "2024-05-01T09:00:00Z".into(),
        };
        assert!(matches!(session.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn lesson_defaults_and_patch_drops_subject() {
        let fields: LessonFields = serde_json::from_value(json!({
            "title": "Limits",
            "subjectId": "s1",
            "dueDate": "2024-05-01",
            "isComplete": true
        }))
        .unwrap();
        let lesson = Lesson::from_fields("l1".into(), fields.clone()).unwrap();
        assert_eq!(lesson.description, "");
        assert!(!lesson.is_complete);

        let patch = Lesson::into_patch(fields).unwrap();
        let value = serde_json::to_value(&patch).unwrap();
        assert!(value.get("subjectId").is_none());
        assert_eq!(value["isComplete"], json!(true));
    }
}
