use crate::helper::public_helpers::{self, SubmissionError};
use crate::models::NewSubmission;
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct StoryFilterQuery {
    tag: Option<String>,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/is_server_active", web::get().to(is_server_active))
            .route("/stories", web::get().to(get_stories))
            .route("/stories/map", web::get().to(get_map_markers))
            .route("/stories/{id}", web::get().to(get_story_by_id))
            .route("/tags", web::get().to(get_tags))
            .route("/organisations", web::get().to(get_organisations))
            .route("/advisors", web::get().to(get_advisors))
            .route("/blog", web::get().to(get_latest_blog_posts))
            .route("/blog/{id}", web::get().to(get_blog_post_by_id))
            .route("/submissions", web::post().to(create_submission)),
    );
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

fn list_or_500<T: serde::Serialize, E: std::fmt::Display>(what: &str, result: Result<T, E>) -> HttpResponse {
    match result {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => {
            log::error!("Failed to fetch {}: {}", what, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_stories(pool: web::Data<DbPool>, query: web::Query<StoryFilterQuery>) -> impl Responder {
    list_or_500("stories", public_helpers::fetch_stories(&pool, query.tag.as_deref()))
}

async fn get_map_markers(pool: web::Data<DbPool>) -> impl Responder {
    list_or_500("map markers", public_helpers::fetch_map_markers(&pool))
}

async fn get_story_by_id(id: web::Path<String>, pool: web::Data<DbPool>) -> impl Responder {
    match public_helpers::fetch_story(&pool, &id) {
        Ok(Some(story)) => HttpResponse::Ok().json(story),
        Ok(None) => HttpResponse::NotFound().body("Story not found"),
        Err(e) => {
            log::error!("Failed to fetch story '{}': {}", id, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_tags(pool: web::Data<DbPool>) -> impl Responder {
    list_or_500("tags", public_helpers::fetch_tags(&pool))
}

async fn get_organisations(pool: web::Data<DbPool>) -> impl Responder {
    list_or_500("organisations", public_helpers::fetch_organisations(&pool))
}

async fn get_advisors(pool: web::Data<DbPool>) -> impl Responder {
    list_or_500("advisors", public_helpers::fetch_advisors(&pool))
}

async fn get_latest_blog_posts(db: web::Data<Arc<Database>>, query: web::Query<PageQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(10);
    let offset = query.offset.unwrap_or(0);
    list_or_500("blog posts", public_helpers::fetch_latest_blog_posts(&db, limit, offset))
}

async fn get_blog_post_by_id(id: web::Path<String>, db: web::Data<Arc<Database>>) -> impl Responder {
    match public_helpers::fetch_blog_post(&db, &id) {
        Ok(Some(post)) => HttpResponse::Ok().json(post),
        Ok(None) => HttpResponse::NotFound().body("Post not found"),
        Err(e) => {
            log::error!("Failed to fetch blog post '{}': {}", id, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn create_submission(
    pool: web::Data<DbPool>,
    app_state: web::Data<AppState>,
    body: web::Json<NewSubmission>,
) -> impl Responder {
    let consent_version = app_state.consent_policy_version();
    match public_helpers::submit_story(&pool, body.into_inner(), &consent_version) {
        Ok(id) => HttpResponse::Created().json(json!({ "success": true, "data": { "id": id }, "error": null })),
        Err(SubmissionError::Backend(e)) => {
            log::error!("Failed to store submission: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "data": null, "error": "Could not store your story." }))
        }
        Err(e) => HttpResponse::BadRequest().json(json!({ "success": false, "data": null, "error": e.to_string() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::blog_db_operations::{self, test_support::blog_db};
    use crate::models::db_operations::catalog_db_operations;
    use crate::models::db_operations::test_support::content_pool;
    use crate::models::{BlogPostDraft, StoryDraft};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn submissions_are_stamped_with_the_live_policy_version() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let state = web::Data::new(AppState::new("2024-01".to_string()));
        state.set_consent_policy_version("2025-06");

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(Arc::new(db)))
                .app_data(state.clone())
                .configure(config_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/submissions")
            .set_json(json!({ "name": "Ravi", "email": "ravi@example.org", "story": "Monsoon shifted.", "consent": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/submissions")
            .set_json(json!({ "name": "Ravi", "email": "ravi@example.org", "story": "Monsoon shifted." }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let conn = pool.get().unwrap();
        let all = crate::models::db_operations::submissions_db_operations::read_all_submissions(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].consent_version, "2025-06");
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[actix_web::test]
    async fn map_only_lists_located_stories_and_blog_posts_render() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        {
            let mut conn = pool.get().unwrap();
            let located = StoryDraft {
                title: "Glacier".to_string(),
                latitude: Some(46.5),
                longitude: Some(8.0),
                ..Default::default()
            };
            catalog_db_operations::create_story(&mut conn, &located).unwrap();
            catalog_db_operations::create_story(&mut conn, &StoryDraft { title: "Unplaced".to_string(), ..Default::default() })
                .unwrap();
        }
        let post_id = blog_db_operations::create_blog_post(
            &db,
            &BlogPostDraft { title: "Notes".to_string(), content: "**bold**".to_string(), ..Default::default() },
        )
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(Arc::new(db)))
                .app_data(web::Data::new(AppState::new("2024-01".to_string())))
                .configure(config_api),
        )
        .await;

        let markers: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/stories/map").to_request()).await;
        assert_eq!(markers.as_array().unwrap().len(), 1);
        assert_eq!(markers[0]["title"], "Glacier");

        let stories: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/stories").to_request()).await;
        assert_eq!(stories.as_array().unwrap().len(), 2);

        let uri = format!("/api/blog/{}", post_id);
        let post: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(post["html"], "<p><strong>bold</strong></p>\n");

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/blog/00000000-0000-0000-0000-000000000000").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let _ = std::fs::remove_dir_all(dir);
    }
}
