//! Typed CRUD for the school entities.
//!
//! Each entity lives under a fixed collection path (`/students`,
//! `/teachers`, ...). Calls go through [`ApiClient`], so the refresh
//! protocol applies to all of them.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::error::ApiError;
use super::transport::HttpTransport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub enrollment_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub subject_ids: Vec<String>,
}

/// A class (form group) of students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub grade_level: Option<u8>,
    #[serde(default)]
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// One entry of the admin audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub created_at: String,
}

/// Collections come back either bare or wrapped in `{"data": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) | ListResponse::Wrapped { data: items } => items,
        }
    }
}

/// CRUD handle for one entity collection.
pub struct Resource<'a, R, T: HttpTransport> {
    client: &'a ApiClient<T>,
    path: &'static str,
    _entity: PhantomData<R>,
}

impl<'a, R, T> Resource<'a, R, T>
where
    R: DeserializeOwned,
    T: HttpTransport,
{
    pub fn new(client: &'a ApiClient<T>, path: &'static str) -> Self {
        Self {
            client,
            path,
            _entity: PhantomData,
        }
    }

    /// GET {path}, optionally filtered with `?search=`.
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<R>, ApiError> {
        let path = match search {
            Some(q) => format!("{}?search={}", self.path, urlencoding::encode(q)),
            None => self.path.to_string(),
        };
        let items: ListResponse<R> = self.client.get(&path).await?;
        Ok(items.into_vec())
    }

    pub async fn get(&self, id: &str) -> Result<R, ApiError> {
        self.client.get(&self.item_path(id)).await
    }

    pub async fn create<B: Serialize + ?Sized>(&self, input: &B) -> Result<R, ApiError> {
        self.client.post(self.path, input).await
    }

    /// PATCH {path}/{id} with a partial update.
    pub async fn update<B: Serialize + ?Sized>(&self, id: &str, input: &B) -> Result<R, ApiError> {
        self.client.patch(&self.item_path(id), input).await
    }

    /// DELETE {path}/{id}. Any response body is discarded.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self.client.delete(&self.item_path(id)).await?;
        Ok(())
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path, urlencoding::encode(id))
    }
}

/// Read-only view of the activity log.
pub struct ActivityLogs<'a, T: HttpTransport> {
    client: &'a ApiClient<T>,
}

impl<T: HttpTransport> ActivityLogs<'_, T> {
    /// GET /activity-logs?page={page}&limit={limit}
    pub async fn list(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<ActivityLog>, ApiError> {
        let mut params = Vec::new();
        if let Some(page) = page {
            params.push(format!("page={}", page));
        }
        if let Some(limit) = limit {
            params.push(format!("limit={}", limit));
        }
        let path = if params.is_empty() {
            "/activity-logs".to_string()
        } else {
            format!("/activity-logs?{}", params.join("&"))
        };
        let items: ListResponse<ActivityLog> = self.client.get(&path).await?;
        Ok(items.into_vec())
    }
}

impl<T: HttpTransport> ApiClient<T> {
    pub fn students(&self) -> Resource<'_, Student, T> {
        Resource::new(self, "/students")
    }

    pub fn teachers(&self) -> Resource<'_, Teacher, T> {
        Resource::new(self, "/teachers")
    }

    pub fn classes(&self) -> Resource<'_, SchoolClass, T> {
        Resource::new(self, "/classes")
    }

    pub fn subjects(&self) -> Resource<'_, Subject, T> {
        Resource::new(self, "/subjects")
    }

    pub fn activity_logs(&self) -> ActivityLogs<'_, T> {
        ActivityLogs { client: self }
    }
}
