//! Read-only views computed from full listings: study hours per subject and
//! a day-by-day calendar.
//!
//! Both views resolve soft references and silently drop the ones that dangle.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::{Exam, Lesson, StudySession, Subject};
use crate::time::parse_iso;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
    pub subject_id: String,
    pub name: String,
    pub color: String,
    /// Whole hours, each session truncated on its own.
    pub hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CalendarEvent {
    Exam { data: Exam, subject: Option<Subject> },
    Session { data: StudySession, subject: Option<Subject> },
    Lesson { data: Lesson, subject: Option<Subject> },
}

impl CalendarEvent {
    fn when(&self) -> Option<NaiveDateTime> {
        match self {
            CalendarEvent::Exam { data, .. } => parse_iso(&data.date),
            CalendarEvent::Session { data, .. } => parse_iso(&data.start_time),
            CalendarEvent::Lesson { data, .. } => parse_iso(&data.due_date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDay {
    /// `YYYY-MM-DD`
    pub date: String,
    pub events: Vec<CalendarEvent>,
}

/// Hours studied per subject, in subject order. Subjects without any
/// attributable hours are left out.
pub fn progress(subjects: &[Subject], exams: &[Exam], sessions: &[StudySession]) -> Vec<SubjectProgress> {
    let exams_by_id: HashMap<&str, &Exam> = exams.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut hours: HashMap<&str, i64> = HashMap::new();

    for session in sessions {
        let Some(exam) = exams_by_id.get(session.exam_id.as_str()) else {
            continue;
        };
        let (Some(start), Some(end)) = (parse_iso(&session.start_time), parse_iso(&session.end_time)) else {
            continue;
        };
        *hours.entry(exam.subject_id.as_str()).or_default() += (end - start).num_hours();
    }

    subjects
        .iter()
        .filter_map(|subject| {
            let total = hours.get(subject.id.as_str()).copied().unwrap_or(0);
            (total > 0).then(|| SubjectProgress {
                subject_id: subject.id.clone(),
                name: subject.name.clone(),
                color: subject.color.clone(),
                hours: total,
            })
        })
        .collect()
}

/// Exams, sessions and lessons grouped by calendar day, days ascending and
/// events inside a day ordered by time.
pub fn calendar(
    subjects: &[Subject],
    exams: &[Exam],
    sessions: &[StudySession],
    lessons: &[Lesson],
) -> Vec<CalendarDay> {
    let subjects_by_id: HashMap<&str, &Subject> = subjects.iter().map(|s| (s.id.as_str(), s)).collect();
    let exams_by_id: HashMap<&str, &Exam> = exams.iter().map(|e| (e.id.as_str(), e)).collect();
    let subject_of = |id: &str| subjects_by_id.get(id).map(|s| (*s).clone());

    let mut events: Vec<CalendarEvent> = Vec::new();
    events.extend(exams.iter().map(|exam| CalendarEvent::Exam {
        data: exam.clone(),
        subject: subject_of(&exam.subject_id),
    }));
    events.extend(sessions.iter().map(|session| CalendarEvent::Session {
        data: session.clone(),
        subject: exams_by_id
            .get(session.exam_id.as_str())
            .and_then(|exam| subject_of(&exam.subject_id)),
    }));
    events.extend(
        lessons
            .iter()
            .filter(|lesson| !lesson.due_date.is_empty())
            .map(|lesson| CalendarEvent::Lesson {
                data: lesson.clone(),
                subject: subject_of(&lesson.subject_id),
            }),
    );

    let mut days: BTreeMap<String, Vec<(NaiveDateTime, CalendarEvent)>> = BTreeMap::new();
    for event in events {
        if let Some(when) = event.when() {
            days.entry(when.format("%Y-%m-%d").to_string())
                .or_default()
                .push((when, event));
        }
    }

    days.into_iter()
        .map(|(date, mut events)| {
            events.sort_by_key(|(when, _)| *when);
            CalendarDay {
                date,
                events: events.into_iter().map(|(_, event)| event).collect(),
            }
        })
        .collect()
}
