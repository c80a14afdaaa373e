//! The planner service: four entity stores behind one kind-dynamic API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::MemStore;
use crate::insights::{self, CalendarDay, SubjectProgress};
use crate::model::{Exam, Kind, Lesson, Record, StudySession, Subject};
use crate::store::EntityStore;
use crate::{Error, KVStore, Result};

/// Optional narrowing of a listing. Only lessons honour `subject_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

/// The operations exposed over HTTP and by the CLI.
///
/// Records travel as JSON so one surface serves every [`Kind`].
#[async_trait]
pub trait StudyPlanner: Send + Sync {
    /// Lists every record of `kind` in insertion order.
    async fn list(&self, kind: Kind, filter: &ListFilter) -> Result<Vec<Value>>;
    /// Validates `fields`, assigns a fresh id and stores the record.
    async fn create(&self, kind: Kind, fields: Value) -> Result<Value>;
    /// Merges `fields` into an existing record.
    async fn update(&self, kind: Kind, id: &str, fields: Value) -> Result<Value>;
    /// Returns `false` if there was no such record.
    async fn delete(&self, kind: Kind, id: &str) -> Result<bool>;
    /// Hours studied per subject.
    async fn progress(&self) -> Result<Vec<SubjectProgress>>;
    /// Exams, sessions and lessons grouped by day.
    async fn calendar(&self) -> Result<Vec<CalendarDay>>;
}

/// Embedded planner over a key-value backend.
///
/// Build one per process and share it; there is no global state.
pub struct Planner {
    subjects: EntityStore<Subject>,
    exams: EntityStore<Exam>,
    sessions: EntityStore<StudySession>,
    lessons: EntityStore<Lesson>,
}

fn parse_fields<T: Record>(fields: Value) -> Result<T::Fields> {
    if !fields.is_object() {
        return Err(Error::Validation("request body must be a JSON object".to_string()));
    }
    serde_json::from_value(fields).map_err(|e| Error::Validation(format!("invalid {}: {}", T::ENTITY_NAME, e)))
}

async fn create_record<T: Record>(store: &EntityStore<T>, fields: Value) -> Result<Value> {
    let fields = parse_fields::<T>(fields)?;
    let record = T::from_fields(uuid::Uuid::new_v4().to_string(), fields)?;
    let created = store.create(record).await?;
    Ok(serde_json::to_value(created)?)
}

async fn update_record<T: Record>(store: &EntityStore<T>, id: &str, fields: Value) -> Result<Value> {
    let patch = T::into_patch(parse_fields::<T>(fields)?)?;
    let updated = store.patch(id, &patch).await?;
    Ok(serde_json::to_value(updated)?)
}

fn to_values<T: Serialize>(items: Vec<T>) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|item| serde_json::to_value(item).map_err(Error::from))
        .collect()
}

impl Planner {
    pub fn new(backend: Arc<dyn KVStore>) -> Self {
        Self {
            subjects: EntityStore::new(backend.clone()),
            exams: EntityStore::new(backend.clone()),
            sessions: EntityStore::new(backend.clone()),
            lessons: EntityStore::new(backend),
        }
    }

    /// A planner that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemStore::in_memory()))
    }

    pub fn subjects(&self) -> &EntityStore<Subject> {
        &self.subjects
    }

    pub fn exams(&self) -> &EntityStore<Exam> {
        &self.exams
    }

    pub fn sessions(&self) -> &EntityStore<StudySession> {
        &self.sessions
    }

    pub fn lessons(&self) -> &EntityStore<Lesson> {
        &self.lessons
    }
}

#[async_trait]
impl StudyPlanner for Planner {
    async fn list(&self, kind: Kind, filter: &ListFilter) -> Result<Vec<Value>> {
        match kind {
            Kind::Subjects => to_values(self.subjects.list().await?),
            Kind::Exams => to_values(self.exams.list().await?),
            Kind::StudySessions => to_values(self.sessions.list().await?),
            Kind::Lessons => {
                let mut lessons = self.lessons.list().await?;
                if let Some(subject_id) = filter.subject_id.as_deref().filter(|s| !s.is_empty()) {
                    lessons.retain(|lesson| lesson.subject_id == subject_id);
                }
                to_values(lessons)
            }
        }
    }

    async fn create(&self, kind: Kind, fields: Value) -> Result<Value> {
        match kind {
            Kind::Subjects => create_record(&self.subjects, fields).await,
            Kind::Exams => create_record(&self.exams, fields).await,
            Kind::StudySessions => create_record(&self.sessions, fields).await,
            Kind::Lessons => create_record(&self.lessons, fields).await,
        }
    }

    async fn update(&self, kind: Kind, id: &str, fields: Value) -> Result<Value> {
        match kind {
            Kind::Subjects => update_record(&self.subjects, id, fields).await,
            Kind::Exams => update_record(&self.exams, id, fields).await,
            Kind::StudySessions => update_record(&self.sessions, id, fields).await,
            Kind::Lessons => update_record(&self.lessons, id, fields).await,
        }
    }

    async fn delete(&self, kind: Kind, id: &str) -> Result<bool> {
        match kind {
            Kind::Subjects => self.subjects.delete(id).await,
            Kind::Exams => self.exams.delete(id).await,
            Kind::StudySessions => self.sessions.delete(id).await,
            Kind::Lessons => self.lessons.delete(id).await,
        }
    }

    async fn progress(&self) -> Result<Vec<SubjectProgress>> {
        let (subjects, exams, sessions) =
            futures::try_join!(self.subjects.list(), self.exams.list(), self.sessions.list())?;
        Ok(insights::progress(&subjects, &exams, &sessions))
    }

    async fn calendar(&self) -> Result<Vec<CalendarDay>> {
        let (subjects, exams, sessions, lessons) = futures::try_join!(
            self.subjects.list(),
            self.exams.list(),
            self.sessions.list(),
            self.lessons.list()
        )?;
        Ok(insights::calendar(&subjects, &exams, &sessions, &lessons))
    }
}
