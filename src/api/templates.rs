//! Read-only code template catalog.
//!
//! Templates live on disk as `<language>/<name>.<ext>`; the extension is
//! not part of a template's name.
//!
//! ```text
//! GET /api/templates                    → languages
//! GET /api/templates/{language}         → template names
//! GET /api/templates/{language}/{name}  → template source
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path as UrlPath, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::http::error::AppError;

#[derive(Debug, Serialize)]
pub struct LanguageList {
    pub success: bool,
    pub languages: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TemplateList {
    pub success: bool,
    pub language: String,
    pub templates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TemplateSource {
    pub success: bool,
    pub language: String,
    pub name: String,
    pub content: String,
}

/// Catalog rooted at a directory.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    root: PathBuf,
}

impl TemplateCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(list_languages))
            .route("/{language}", get(list_templates))
            .route("/{language}/{name}", get(get_template))
            .with_state(Arc::new(self))
    }

    pub async fn languages(&self) -> Result<Vec<String>, AppError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::internal(format!("template catalog: {e}"))),
        };

        let mut languages = Vec::new();
        while let Some(entry) = next_entry(&mut entries).await? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    languages.push(name.to_string());
                }
            }
        }
        languages.sort();
        Ok(languages)
    }

    pub async fn templates(&self, language: &str) -> Result<Vec<(String, PathBuf)>, AppError> {
        check_segment(language)?;
        let dir = self.root.join(language);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!("Unknown language: {language}")));
            }
            Err(e) => return Err(AppError::internal(format!("template catalog: {e}"))),
        };

        let mut templates = Vec::new();
        while let Some(entry) = next_entry(&mut entries).await? {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let path = entry.path();
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                templates.push((stem.to_string(), path.clone()));
            }
        }
        templates.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(templates)
    }

    pub async fn source(&self, language: &str, name: &str) -> Result<String, AppError> {
        check_segment(name)?;
        let path = self
            .templates(language)
            .await?
            .into_iter()
            .find(|(stem, _)| stem == name)
            .map(|(_, path)| path)
            .ok_or_else(|| AppError::not_found(format!("Template not found: {name}")))?;

        read_source(&path).await
    }
}

async fn next_entry(entries: &mut tokio::fs::ReadDir) -> Result<Option<tokio::fs::DirEntry>, AppError> {
    entries
        .next_entry()
        .await
        .map_err(|e| AppError::internal(format!("template catalog: {e}")))
}

async fn read_source(path: &Path) -> Result<String, AppError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::internal(format!("reading {}: {e}", path.display())))
}

/// A URL segment must name an entry directly inside its parent.
fn check_segment(segment: &str) -> Result<(), AppError> {
    let traverses = segment.is_empty()
        || segment.starts_with('.')
        || segment.contains(['/', '\\'])
        || segment.contains("..");
    if traverses {
        return Err(AppError::bad_request("Invalid template path"));
    }
    Ok(())
}

async fn list_languages(State(catalog): State<Arc<TemplateCatalog>>) -> Result<Json<LanguageList>, AppError> {
    Ok(Json(LanguageList {
        success: true,
        languages: catalog.languages().await?,
    }))
}

async fn list_templates(
    State(catalog): State<Arc<TemplateCatalog>>,
    UrlPath(language): UrlPath<String>,
) -> Result<Json<TemplateList>, AppError> {
    let templates = catalog
        .templates(&language)
        .await?
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    Ok(Json(TemplateList {
        success: true,
        language,
        templates,
    }))
}

async fn get_template(
    State(catalog): State<Arc<TemplateCatalog>>,
    UrlPath((language, name)): UrlPath<(String, String)>,
) -> Result<Json<TemplateSource>, AppError> {
    let content = catalog.source(&language, &name).await?;
    Ok(Json(TemplateSource {
        success: true,
        language,
        name,
        content,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    fn catalog() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("cpp")).unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();
        std::fs::write(dir.path().join("cpp/Smart Pointer.cpp"), "#include <memory>\n").unwrap();
        std::fs::write(dir.path().join("cpp/Lambda Example.cpp"), "auto f = []{};\n").unwrap();
        std::fs::write(dir.path().join("c/Pipe.c"), "#include <unistd.h>\n").unwrap();

        let router = Router::new().nest("/api/templates", TemplateCatalog::new(dir.path()).router());
        (dir, router)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lists_languages_sorted() {
        let (_dir, router) = catalog();
        let (status, body) = get_json(router, "/api/templates").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["languages"], serde_json::json!(["c", "cpp"]));
    }

    #[tokio::test]
    async fn lists_templates_without_extension() {
        let (_dir, router) = catalog();
        let (status, body) = get_json(router, "/api/templates/cpp").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["templates"], serde_json::json!(["Lambda Example", "Smart Pointer"]));
    }

    #[tokio::test]
    async fn nested_directories_are_not_templates() {
        let (dir, router) = catalog();
        std::fs::create_dir(dir.path().join("cpp/drafts.d")).unwrap();

        let (_, body) = get_json(router.clone(), "/api/templates/cpp").await;
        assert_eq!(body["templates"], serde_json::json!(["Lambda Example", "Smart Pointer"]));

        let (status, _) = get_json(router, "/api/templates/cpp/drafts").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_template_source() {
        let (_dir, router) = catalog();
        let (status, body) = get_json(router, "/api/templates/cpp/Smart%20Pointer").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "#include <memory>\n");
    }

    #[tokio::test]
    async fn unknown_entries_are_declared_not_found() {
        let (_dir, router) = catalog();
        let (status, body) = get_json(router.clone(), "/api/templates/rust").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Unknown language: rust");

        let (status, _) = get_json(router, "/api/templates/c/Missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (_dir, router) = catalog();
        let (status, body) = get_json(router, "/api/templates/..%2Fetc/passwd").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let catalog = TemplateCatalog::new("/nonexistent/catalog");
        assert!(catalog.languages().await.unwrap().is_empty());
    }
}
