use serde::Deserialize;

use ripple_core::{Page, PageRequest};
use ripple_tasks::{JobStatus, Task};
use ripple_users::User;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

#[derive(Debug, Deserialize)]
pub struct LaunchTaskRequest {
    /// Dotted work-function name, e.g. "demo.count_to_ten".
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn user_to_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id.to_string(),
        "username": user.username,
        "about_me": user.about_me,
        "last_seen": user.last_seen.map(|t| t.to_rfc3339()),
        "_links": {
            "self": format!("/users/{}", user.id),
            "followers": format!("/users/{}/followers", user.id),
            "following": format!("/users/{}/following", user.id),
        }
    })
}

pub fn task_to_json(task: &Task, progress: u8, status: Option<JobStatus>) -> serde_json::Value {
    serde_json::json!({
        "id": task.id.to_string(),
        "name": task.name,
        "description": task.description,
        "user_id": task.owner.to_string(),
        "complete": task.complete,
        "progress": progress,
        "status": status.map(|s| s.as_str()),
    })
}

/// Collection representation: items plus `_meta` totals and `_links`
/// self/next/prev navigation for the same endpoint.
pub fn collection_to_json<T>(
    page: &Page<T>,
    base_path: &str,
    to_json: impl Fn(&T) -> serde_json::Value,
) -> serde_json::Value {
    let link = |p: u32| format!("{base_path}?page={p}&per_page={}", page.per_page);

    serde_json::json!({
        "items": page.items.iter().map(to_json).collect::<Vec<_>>(),
        "_meta": {
            "page": page.page,
            "per_page": page.per_page,
            "total_pages": page.total_pages(),
            "total_items": page.total_items,
        },
        "_links": {
            "self": link(page.page),
            "next": page.has_next().then(|| link(page.page + 1)),
            "prev": page.has_prev().then(|| link(page.page - 1)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::UserId;

    #[test]
    fn collection_links_follow_page_position() {
        let page = Page::new(vec![1, 2], PageRequest::new(Some(2), Some(2)), 6);
        let json = collection_to_json(&page, "/users", |n| serde_json::json!(n));

        assert_eq!(json["_meta"]["total_pages"], 3);
        assert_eq!(json["_links"]["self"], "/users?page=2&per_page=2");
        assert_eq!(json["_links"]["next"], "/users?page=3&per_page=2");
        assert_eq!(json["_links"]["prev"], "/users?page=1&per_page=2");
    }

    #[test]
    fn first_page_has_no_prev_link() {
        let page = Page::new(vec![1], PageRequest::default(), 1);
        let json = collection_to_json(&page, "/users", |n| serde_json::json!(n));
        assert!(json["_links"]["prev"].is_null());
        assert!(json["_links"]["next"].is_null());
    }

    #[test]
    fn task_json_carries_progress_and_status() {
        let task = Task::new(
            ripple_core::JobId::from_string("job-1"),
            "demo.export",
            "export posts",
            UserId::new(),
        );
        let json = task_to_json(&task, 40, Some(JobStatus::Running));
        assert_eq!(json["progress"], 40);
        assert_eq!(json["status"], "running");
        assert_eq!(json["complete"], false);
    }
}
