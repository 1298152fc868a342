use super::stats::week_keys;
use super::{to_record, upsert_by_id, DomainStore};
use crate::bus::ChangeKind;
use crate::constants::keys;
use crate::error::AppError;
use crate::models::Task;
use crate::remote::{Effect, Entity};
use crate::validation::validate_task_title;
use chrono::{Days, NaiveDate};
use serde_json::json;

impl DomainStore {
    pub fn tasks(&self) -> Vec<Task> {
        self.read_collection(keys::TASKS, Task::from_value)
    }

    pub fn incomplete_tasks(&self) -> Vec<Task> {
        self.tasks().into_iter().filter(|t| !t.completed).collect()
    }

    /// Insert or replace a task by id. A blank id gets a fresh UUID and a
    /// missing creation stamp is filled in.
    pub fn save_task(&self, mut task: Task) -> Result<Task, AppError> {
        task.title = validate_task_title(&task.title)?.to_string();
        if task.id.trim().is_empty() {
            task.id = uuid::Uuid::new_v4().to_string();
        }
        if task.created_at.is_none() {
            task.created_at = Some(self.now_iso());
        }

        let inserted = {
            let _guard = self.lock_writes();
            let mut tasks = self.tasks();
            let inserted = upsert_by_id(&mut tasks, task.clone(), |t| t.id.as_str());
            self.write_json(keys::TASKS, &tasks)?;
            inserted
        };

        self.publish(ChangeKind::Tasks);
        let record = to_record(&task);
        self.emit(|owner| {
            if inserted {
                Effect::Create {
                    entity: Entity::Tasks,
                    owner,
                    record,
                }
            } else {
                Effect::Update {
                    entity: Entity::Tasks,
                    id: task.id.clone(),
                    partial: record,
                }
            }
        });
        Ok(task)
    }

    pub fn delete_task(&self, id: &str) -> Result<(), AppError> {
        {
            let _guard = self.lock_writes();
            let mut tasks = self.tasks();
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            if tasks.len() == before {
                return Err(AppError::NotFound { entity: "Task" });
            }
            self.write_json(keys::TASKS, &tasks)?;
        }

        self.publish(ChangeKind::Tasks);
        self.emit(|_| Effect::Delete {
            entity: Entity::Tasks,
            id: id.to_string(),
        });
        Ok(())
    }

    /// Replace the whole collection. Local only: nothing is sent remotely.
    pub fn set_tasks(&self, tasks: &[Task]) -> Result<(), AppError> {
        {
            let _guard = self.lock_writes();
            self.write_json(keys::TASKS, tasks)?;
        }
        self.publish(ChangeKind::Tasks);
        Ok(())
    }

    /// Flip completion, stamping or clearing `completedAt`.
    pub fn toggle_task(&self, id: &str) -> Result<Task, AppError> {
        let now = self.now_iso();
        let toggled = {
            let _guard = self.lock_writes();
            let mut tasks = self.tasks();
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(AppError::NotFound { entity: "Task" })?;
            task.completed = !task.completed;
            task.completed_at = task.completed.then_some(now);
            let toggled = task.clone();
            self.write_json(keys::TASKS, &tasks)?;
            toggled
        };

        self.publish(ChangeKind::Tasks);
        self.emit(|_| Effect::Update {
            entity: Entity::Tasks,
            id: toggled.id.clone(),
            partial: json!({
                "completed": toggled.completed,
                "completedAt": toggled.completed_at,
            }),
        });
        Ok(toggled)
    }

    /// Number of tasks completed on a `YYYY-MM-DD` day.
    pub fn tasks_completed_on(&self, date: &str) -> usize {
        self.tasks()
            .iter()
            .filter(|t| t.completion_day() == Some(date))
            .count()
    }

    /// Tasks completed Monday to Sunday of the current week. Completions with
    /// no date at all are counted here.
    pub fn weekly_tasks_completed(&self) -> usize {
        self.tasks_completed_in_week(self.clock.today(), true)
    }

    pub fn previous_week_tasks_completed(&self) -> usize {
        self.clock
            .today()
            .checked_sub_days(Days::new(7))
            .map_or(0, |day| self.tasks_completed_in_week(day, false))
    }

    fn tasks_completed_in_week(&self, day: NaiveDate, count_undated: bool) -> usize {
        let week = week_keys(day);
        self.tasks()
            .iter()
            .filter(|t| t.completed)
            .filter(|t| match t.completion_day() {
                Some(date) => week.iter().any(|key| key == date),
                None => count_undated,
            })
            .count()
    }

    /// Server-wins merge of remote tasks. Publishes but never echoes remotely.
    pub(crate) fn merge_remote_tasks(&self, remote: Vec<Task>) -> Result<usize, AppError> {
        let applied = {
            let _guard = self.lock_writes();
            let mut tasks = self.tasks();
            let applied = super::merge_by_id(&mut tasks, remote, |t| t.id.as_str());
            self.write_json(keys::TASKS, &tasks)?;
            applied
        };
        self.publish(ChangeKind::Tasks);
        Ok(applied)
    }
}
