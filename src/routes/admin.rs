use crate::config::Config;
use crate::helper::admin_helpers::{self, AdminLogin};
use crate::helper::editor_helpers::{self, DeleteOutcome, EditorError, EntityStore};
use crate::helper::entity_stores::{AdvisorStore, BlogStore, OrganisationStore, StoryStore, TagStore};
use crate::helper::geocoding::{self, NominatimGeocoder};
use crate::helper::media_helpers::{self, UploadError, UploadPolicy};
use crate::helper::moderation_helpers::{self, DeletionProgress, ModerationError, ModerationOverview};
use crate::helper::{form_helpers, public_helpers, session_helpers};
use crate::middleware::AuthenticatedAdmin;
use crate::models::confirmation::{DeletionAction, DeletionSession, DeletionStep, CONFIRMATION_PHRASE};
use crate::models::db_operations::users_db_operations::ROLE_ADMIN;
use crate::models::db_operations::DbError;
use crate::models::inline_editor::{EditingTarget, InlineEditorState};
use crate::models::{Notification, StoryDraft};
use crate::{AppState, DbPool};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tera::{Context, Tera};

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    username: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_login(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::get().to(show_admin_login_form))
        .route("/login", web::post().to(handle_admin_login))
        .route("/logout", web::post().to(handle_admin_logout));
}

pub fn config_dashboard(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(show_admin_dashboard))
        .route("/update_settings", web::post().to(update_settings_action))
        .service(
            web::scope("/api")
                .route("/submissions", web::get().to(list_submissions_api))
                .route("/submissions/confirmation", web::post().to(type_confirmation_api))
                .route("/submissions/delete/cancel", web::post().to(cancel_deletion_api))
                .route("/submissions/{id}/approve", web::post().to(approve_submission_api))
                .route("/submissions/{id}/delete", web::post().to(delete_submission_api))
                .route("/images", web::post().to(upload_images_api))
                .configure(config_editor::<TagStore>)
                .configure(config_editor::<OrganisationStore>)
                .configure(config_editor::<AdvisorStore>)
                .configure(config_editor::<BlogStore>)
                .configure(config_story_editor),
        );
}

/// Registers the list/edit/cancel/save/delete routes for one kind.
fn config_editor<S>(cfg: &mut web::ServiceConfig)
where
    S: EntityStore + 'static,
    S::Draft: 'static,
{
    config_editor_session_routes::<S>(cfg);
    cfg.route(&format!("/{}/save", S::KIND), web::post().to(save_entity_api::<S>));
}

// Stories are saved through their own handler so the geocoder can run first.
fn config_story_editor(cfg: &mut web::ServiceConfig) {
    config_editor_session_routes::<StoryStore>(cfg);
    cfg.route("/stories/save", web::post().to(save_story_api));
}

fn config_editor_session_routes<S>(cfg: &mut web::ServiceConfig)
where
    S: EntityStore + 'static,
{
    cfg.route(&format!("/{}", S::KIND), web::get().to(list_entities_api::<S>))
        .route(&format!("/{}/edit", S::KIND), web::post().to(begin_edit_api::<S>))
        .route(&format!("/{}/cancel", S::KIND), web::post().to(cancel_edit_api::<S>))
        .route(&format!("/{}/{{id}}/delete", S::KIND), web::post().to(delete_entity_api::<S>));
}

// --- Response helpers ---

fn json_success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data, "error": null }))
}

fn json_failure<T: Serialize>(status: StatusCode, error: &str, data: T) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "success": false, "data": data, "error": error }))
}

fn db_error_status(err: &DbError) -> StatusCode {
    match err {
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn set_notification(session: &Session, message: &str, r#type: &str) {
    let notification = Notification { message: message.to_string(), r#type: r#type.to_string() };
    if let Err(e) = session.insert("notification", &notification) {
        log::error!("Could not store notification in session: {}", e);
    }
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().append_header(("location", location)).finish()
}

// --- Login / logout ---

async fn show_admin_login_form(
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
    config: web::Data<Config>,
) -> impl Responder {
    if session.get::<String>("role").unwrap_or(None).as_deref() == Some(ROLE_ADMIN) {
        return redirect(&format!("{}/dashboard", config.admin_base_url()));
    }

    let mut ctx = Context::new();
    ctx.insert("admin_url_prefix", &config.admin_url_prefix);
    ctx.insert("csrf_token", token.get());

    if let Ok(Some(error)) = session.get::<String>("error") {
        ctx.insert("error", &error);
        session.remove("error");
    }

    match tera.render("admin/login.html", &ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(e) => {
            log::error!("Template rendering error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

async fn handle_admin_login(
    session: Session,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<LoginForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let login_url = format!("{}/login", config.admin_base_url());
    let dashboard_url = format!("{}/dashboard", config.admin_base_url());
    let login_data = form.into_inner();

    let error = match admin_helpers::verify_admin_credentials(&pool, &login_data.username, &login_data.password) {
        AdminLogin::Admin(username) => {
            session.renew();
            let stored = session
                .insert("username", &username)
                .and_then(|_| session.insert("role", ROLE_ADMIN));
            match stored {
                Ok(()) => {
                    session.remove("error");
                    log::info!("Admin '{}' signed in", username);
                    return redirect(&dashboard_url);
                }
                Err(e) => {
                    log::error!("Could not store admin session: {}", e);
                    "Could not start a session. Please try again."
                }
            }
        }
        AdminLogin::NotAnAdmin => "Access denied. Only administrators may log in here.",
        AdminLogin::Invalid => "Invalid credentials or account suspended.",
    };
    if let Err(e) = session.insert("error", error) {
        log::error!("Could not store login error in session: {}", e);
    }
    redirect(&login_url)
}

/// Signing out drops the whole session, including any half-finished
/// deletion confirmation or open editor.
async fn handle_admin_logout(session: Session, config: web::Data<Config>) -> impl Responder {
    session.purge();
    redirect(&format!("{}/login", config.admin_base_url()))
}

// --- Dashboard and settings ---

#[derive(Serialize)]
struct DeletionView<'a> {
    step: DeletionStep,
    step_index: u8,
    target: Option<&'a str>,
    typed_text: &'a str,
    phrase: &'static str,
}

impl<'a> DeletionView<'a> {
    fn of(session: &'a DeletionSession) -> Self {
        DeletionView {
            step: session.step,
            step_index: session.step.index(),
            target: session.target.as_deref(),
            typed_text: &session.typed_text,
            phrase: CONFIRMATION_PHRASE,
        }
    }
}

async fn show_admin_dashboard(
    auth_user: AuthenticatedAdmin,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    blog: web::Data<BlogStore>,
    token: CsrfToken,
    config: web::Data<Config>,
) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("admin_url_prefix", &config.admin_url_prefix);
    ctx.insert("user", &auth_user);
    ctx.insert("csrf_token", token.get());

    if let Ok(Some(notification)) = session.get::<Notification>("notification") {
        ctx.insert("notification", &notification);
        session.remove("notification");
    }

    match admin_helpers::load_settings(&pool) {
        Ok(settings) => ctx.insert("settings", &settings),
        Err(e) => {
            log::error!("Could not load settings for admin dashboard: {}", e);
            ctx.insert(
                "settings",
                &admin_helpers::Settings {
                    max_file_upload_size_mb: "0".to_string(),
                    allowed_mime_types: String::new(),
                    consent_policy_version: "error-loading".to_string(),
                },
            );
        }
    }

    match moderation_helpers::load_overview(pool.get_ref()) {
        Ok(overview) => ctx.insert("overview", &overview),
        Err(e) => {
            log::error!("Failed to load submissions for admin dashboard: {}", e);
            ctx.insert("overview", &ModerationOverview::from_submissions(Vec::new()));
        }
    }

    let deletion = session_helpers::load_deletion_session(&session);
    ctx.insert("deletion", &DeletionView::of(&deletion));

    // Listings fall back to empty so one broken table does not hide the rest.
    macro_rules! listing {
        ($name:literal, $fetch:expr) => {
            match $fetch {
                Ok(records) => ctx.insert($name, &records),
                Err(e) => {
                    log::error!("Failed to load {} for admin dashboard: {}", $name, e);
                    ctx.insert($name, &Vec::<String>::new());
                }
            }
        };
    }
    listing!("tags", public_helpers::fetch_tags(&pool));
    listing!("stories", public_helpers::fetch_stories(&pool, None));
    listing!("organisations", public_helpers::fetch_organisations(&pool));
    listing!("advisors", public_helpers::fetch_advisors(&pool));
    listing!("blog_posts", blog.list());

    match tera.render("admin/dashboard.html", &ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error: {}", err);
            HttpResponse::InternalServerError().body("Error rendering admin dashboard.")
        }
    }
}

async fn update_settings_action(
    session: Session,
    pool: web::Data<DbPool>,
    form: web::Bytes,
    app_state: web::Data<AppState>,
    config: web::Data<Config>,
) -> impl Responder {
    let dashboard_url = format!("{}/dashboard", config.admin_base_url());

    let parsed = match form_helpers::parse_form(&form) {
        Ok(p) => p,
        Err(response) => return response,
    };

    let max_size = form_helpers::trimmed(&parsed, "max_file_upload_size_mb");
    let mime_types = form_helpers::trimmed(&parsed, "allowed_mime_types");
    let policy_version = form_helpers::trimmed(&parsed, "consent_policy_version");

    if admin_helpers::parse_upload_size_mb(max_size).is_none() {
        let message = format!(
            "Invalid max file size. It must be a whole number between 0 and {}.",
            admin_helpers::MAX_UPLOAD_SIZE_MB
        );
        set_notification(&session, &message, "error");
        return redirect(&dashboard_url);
    }
    if policy_version.is_empty() {
        set_notification(&session, "The consent policy version cannot be empty.", "error");
        return redirect(&dashboard_url);
    }

    let results = [
        admin_helpers::update_setting(&pool, "max_file_upload_size_mb", max_size),
        admin_helpers::update_setting(&pool, "allowed_mime_types", mime_types),
        admin_helpers::update_setting(&pool, "consent_policy_version", policy_version),
    ];
    match results.iter().find_map(|r| r.as_ref().err()) {
        None => {
            app_state.set_consent_policy_version(policy_version);
            set_notification(&session, "Settings updated successfully.", "success");
        }
        Some(e) => {
            log::error!("Failed to update one or more settings: {}", e);
            set_notification(&session, "Failed to update settings in database.", "error");
        }
    }
    redirect(&dashboard_url)
}

// --- Submission moderation API ---

async fn list_submissions_api(pool: web::Data<DbPool>, session: Session) -> impl Responder {
    let deletion = session_helpers::load_deletion_session(&session);
    match moderation_helpers::load_overview(pool.get_ref()) {
        Ok(overview) => json_success(json!({ "overview": overview, "deletion": DeletionView::of(&deletion) })),
        Err(e) => {
            log::error!("Failed to load submissions: {}", e);
            json_failure(db_error_status(&e), &e.to_string(), json!({ "deletion": DeletionView::of(&deletion) }))
        }
    }
}

async fn approve_submission_api(pool: web::Data<DbPool>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match moderation_helpers::approve_submission(pool.get_ref(), &id) {
        Ok(overview) => json_success(json!({ "overview": overview })),
        Err(e) => {
            log::error!("Failed to approve submission {}: {}", id, e);
            json_failure(db_error_status(&e), &e.to_string(), json!(null))
        }
    }
}

#[derive(Deserialize, Default)]
struct DeleteSubmissionRequest {
    #[serde(default)]
    confirmation_text: Option<String>,
}

#[derive(Deserialize)]
struct ConfirmationTextRequest {
    text: String,
}

/// Runs the actions through the confirmation workflow in order, stopping at
/// the first error, then persists the resulting session.
fn run_deletion_actions(pool: &DbPool, session: &Session, actions: Vec<DeletionAction>) -> HttpResponse {
    let mut current = session_helpers::load_deletion_session(session);
    let mut result: Result<DeletionProgress, ModerationError> = Ok(DeletionProgress::Advanced);
    for action in actions {
        let report = moderation_helpers::apply_deletion_action(pool, &current, action);
        current = report.session;
        result = report.result;
        if result.is_err() {
            break;
        }
    }

    if let Err(e) = session_helpers::store_deletion_session(session, &current) {
        log::error!("Could not persist deletion session: {}", e);
        return json_failure(StatusCode::INTERNAL_SERVER_ERROR, "Could not store the confirmation state.", json!(null));
    }

    let view = DeletionView::of(&current);
    match result {
        Ok(DeletionProgress::Advanced) => json_success(json!({ "deleted": false, "deletion": view })),
        Ok(DeletionProgress::Deleted { submission_id, overview: Ok(overview) }) => json_success(json!({
            "deleted": true,
            "submission_id": submission_id,
            "overview": overview,
            "deletion": view,
        })),
        // The record is gone either way; only the refreshed list is missing.
        Ok(DeletionProgress::Deleted { submission_id, overview: Err(e) }) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": {
                "deleted": true,
                "submission_id": submission_id,
                "overview": null,
                "deletion": view,
            },
            "error": format!("Submission deleted, but the list could not be reloaded: {}", e),
        })),
        Err(ModerationError::Confirmation(e)) => {
            json_failure(StatusCode::BAD_REQUEST, &e.to_string(), json!({ "deleted": false, "deletion": view }))
        }
        Err(ModerationError::Backend(e)) => {
            log::error!("Submission deletion failed: {}", e);
            json_failure(db_error_status(&e), &e.to_string(), json!({ "deleted": false, "deletion": view }))
        }
    }
}

async fn delete_submission_api(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<String>,
    body: Option<web::Json<DeleteSubmissionRequest>>,
) -> impl Responder {
    let submission_id = path.into_inner();
    let request = body.map(|b| b.into_inner()).unwrap_or_default();

    let mut actions = Vec::new();
    if let Some(text) = request.confirmation_text {
        actions.push(DeletionAction::Type { text });
    }
    actions.push(DeletionAction::Delete { submission_id });
    run_deletion_actions(&pool, &session, actions)
}

async fn type_confirmation_api(
    pool: web::Data<DbPool>,
    session: Session,
    body: web::Json<ConfirmationTextRequest>,
) -> impl Responder {
    let text = body.into_inner().text;
    run_deletion_actions(&pool, &session, vec![DeletionAction::Type { text }])
}

async fn cancel_deletion_api(pool: web::Data<DbPool>, session: Session) -> impl Responder {
    run_deletion_actions(&pool, &session, vec![DeletionAction::Cancel])
}

// --- Inline editors ---

#[derive(Deserialize)]
struct EditRequest {
    target: EditingTarget,
}

fn persist_editor<S: EntityStore>(session: &Session, state: &InlineEditorState) -> Result<(), HttpResponse> {
    session_helpers::store_editor_state(session, S::KIND, state).map_err(|e| {
        log::error!("Could not persist {} editor state: {}", S::KIND, e);
        json_failure(StatusCode::INTERNAL_SERVER_ERROR, "Could not store the editor state.", json!(null))
    })
}

fn editor_error_response<S: EntityStore>(err: &EditorError, state: &InlineEditorState) -> HttpResponse {
    if !err.is_validation() {
        log::error!("{} editor backend failure: {}", S::KIND, err);
    }
    let status = match err {
        EditorError::Backend(db) => db_error_status(db),
        _ => StatusCode::BAD_REQUEST,
    };
    json_failure(status, &err.to_string(), json!({ "editor": state }))
}

async fn list_entities_api<S: EntityStore + 'static>(store: web::Data<S>, session: Session) -> impl Responder {
    let state = session_helpers::load_editor_state(&session, S::KIND);
    match store.list() {
        Ok(records) => json_success(json!({ "records": records, "editor": state })),
        Err(e) => {
            log::error!("Failed to list {}: {}", S::KIND, e);
            json_failure(db_error_status(&e), &e.to_string(), json!({ "editor": state }))
        }
    }
}

async fn begin_edit_api<S: EntityStore + 'static>(session: Session, body: web::Json<EditRequest>) -> impl Responder {
    let mut state = session_helpers::load_editor_state(&session, S::KIND);
    state.begin(body.into_inner().target);
    if let Err(response) = persist_editor::<S>(&session, &state) {
        return response;
    }
    json_success(json!({ "editor": state }))
}

async fn cancel_edit_api<S: EntityStore + 'static>(session: Session) -> impl Responder {
    let mut state = session_helpers::load_editor_state(&session, S::KIND);
    state.cancel();
    if let Err(response) = persist_editor::<S>(&session, &state) {
        return response;
    }
    json_success(json!({ "editor": state }))
}

fn finish_save<S: EntityStore>(
    session: &Session,
    mut state: InlineEditorState,
    result: Result<Vec<S::Record>, EditorError>,
) -> HttpResponse {
    // A failed save keeps the target but clears any armed delete.
    if result.is_err() {
        state.disarm();
    }
    if let Err(response) = persist_editor::<S>(session, &state) {
        return response;
    }
    match result {
        Ok(records) => json_success(json!({ "records": records, "editor": state })),
        Err(e) => editor_error_response::<S>(&e, &state),
    }
}

async fn save_entity_api<S>(store: web::Data<S>, session: Session, body: web::Json<S::Draft>) -> impl Responder
where
    S: EntityStore + 'static,
    S::Draft: 'static,
{
    let mut state = session_helpers::load_editor_state(&session, S::KIND);
    let result = editor_helpers::save_entity(store.get_ref(), &mut state, body.into_inner());
    finish_save::<S>(&session, state, result)
}

async fn save_story_api(
    store: web::Data<StoryStore>,
    geocoder: web::Data<NominatimGeocoder>,
    session: Session,
    body: web::Json<StoryDraft>,
) -> impl Responder {
    let mut state = session_helpers::load_editor_state(&session, StoryStore::KIND);
    let mut draft = body.into_inner();
    // Only geocode drafts that will actually be saved.
    if state.editing.is_some() && !draft.title.trim().is_empty() {
        geocoding::fill_story_coordinates(geocoder.get_ref(), &mut draft).await;
    }
    let result = editor_helpers::save_entity(store.get_ref(), &mut state, draft);
    finish_save::<StoryStore>(&session, state, result)
}

async fn delete_entity_api<S: EntityStore + 'static>(
    store: web::Data<S>,
    session: Session,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    let mut state = session_helpers::load_editor_state(&session, S::KIND);
    let result = editor_helpers::press_delete(store.get_ref(), &mut state, &id);
    if let Err(response) = persist_editor::<S>(&session, &state) {
        return response;
    }
    match result {
        Ok(DeleteOutcome::Armed { id }) => json_success(json!({ "deleted": false, "armed": id, "editor": state })),
        Ok(DeleteOutcome::Deleted { id, records }) => {
            json_success(json!({ "deleted": true, "id": id, "records": records, "editor": state }))
        }
        Err(e) => editor_error_response::<S>(&e, &state),
    }
}

// --- Images ---

async fn upload_images_api(pool: web::Data<DbPool>, config: web::Data<Config>, payload: Multipart) -> impl Responder {
    let settings = match admin_helpers::load_settings(&pool) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Could not load upload settings: {}", e);
            return json_failure(StatusCode::INTERNAL_SERVER_ERROR, "Could not load upload settings.", json!(null));
        }
    };
    let policy = UploadPolicy::from_settings(&settings);

    match media_helpers::upload_image_batch(PathBuf::from(&config.media_path), policy, payload).await {
        Ok(images) => json_success(json!({ "images": images })),
        Err(batch) => {
            let status = match batch.source {
                UploadError::Io(_) | UploadError::Sidecar(_) | UploadError::Blocking(_) => {
                    log::error!("Image upload failed: {}", batch);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            };
            json_failure(
                status,
                &batch.to_string(),
                json!({
                    "failed_index": batch.failed_index,
                    "filename": batch.filename,
                    "images": batch.uploaded,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::blog_db_operations::test_support::blog_db;
    use crate::models::db_operations::submissions_db_operations;
    use crate::models::db_operations::test_support::content_pool;
    use crate::models::NewSubmission;
    use actix_session::storage::CookieSessionStore;
    use actix_session::SessionMiddleware;
    use actix_web::cookie::{Cookie, Key};
    use actix_web::dev::ServiceResponse;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::sync::Arc;

    fn test_config() -> Config {
        Config {
            web: crate::config::WebConfig { host: "127.0.0.1".to_string(), port: 0 },
            database_path: "/tmp".to_string(),
            media_path: std::env::temp_dir().join("stories-admin-media").display().to_string(),
            allowed_origins: String::new(),
            log_level: "info".to_string(),
            session_secret_key: "ab".repeat(64),
            admin_url_prefix: "desk".to_string(),
            use_secure_cookies: false,
            geocoder_url: "http://127.0.0.1:9".to_string(),
            geocoder_user_agent: "tests".to_string(),
        }
    }

    async fn sign_in_for_tests(session: Session) -> HttpResponse {
        session.insert("username", "root").unwrap();
        session.insert("role", ROLE_ADMIN).unwrap();
        HttpResponse::Ok().finish()
    }

    fn seed_submission(pool: &DbPool) -> String {
        let conn = pool.get().unwrap();
        let new = NewSubmission {
            name: "Amina".to_string(),
            email: "amina@example.org".to_string(),
            story: "Salt water in the wells.".to_string(),
            consent: true,
            ..Default::default()
        };
        submissions_db_operations::create_submission(&conn, &new, "2024-01").unwrap()
    }

    /// Carries the session cookie from one response to the next request.
    struct Browser {
        cookie: Option<Cookie<'static>>,
    }

    impl Browser {
        fn remember<B>(&mut self, resp: &ServiceResponse<B>) {
            if let Some(c) = resp.response().cookies().find(|c| c.name() == "id") {
                self.cookie = Some(c.into_owned());
            }
        }

        fn post(&self, uri: &str) -> test::TestRequest {
            let req = test::TestRequest::post().uri(uri);
            match &self.cookie {
                Some(c) => req.cookie(c.clone()),
                None => req,
            }
        }

        fn get(&self, uri: &str) -> test::TestRequest {
            let req = test::TestRequest::get().uri(uri);
            match &self.cookie {
                Some(c) => req.cookie(c.clone()),
                None => req,
            }
        }
    }

    macro_rules! call {
        ($app:expr, $browser:expr, $req:expr) => {{
            let resp = test::call_service(&$app, $req.to_request()).await;
            $browser.remember(&resp);
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }};
    }

    macro_rules! admin_app {
        ($pool:expr, $blog:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($pool.clone()))
                    .app_data(web::Data::new(TagStore($pool.clone())))
                    .app_data(web::Data::new(StoryStore($pool.clone())))
                    .app_data(web::Data::new(OrganisationStore($pool.clone())))
                    .app_data(web::Data::new(AdvisorStore($pool.clone())))
                    .app_data(web::Data::new(BlogStore($blog.clone())))
                    .app_data(web::Data::new(NominatimGeocoder::new("http://127.0.0.1:9", "tests").unwrap()))
                    .app_data(web::Data::new(test_config()))
                    .app_data(web::Data::new(AppState::new("2024-01".to_string())))
                    .wrap(
                        SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
                            .cookie_secure(false)
                            .build(),
                    )
                    .route("/test_login", web::post().to(sign_in_for_tests))
                    .service(
                        web::scope("/management/desk")
                            .guard(actix_web::guard::fn_guard(|ctx| {
                                use actix_session::SessionExt;
                                crate::middleware::admin_guard(&ctx.get_session())
                            }))
                            .configure(config_dashboard),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn four_presses_and_the_phrase_delete_a_submission() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let blog = Arc::new(db);
        let id = seed_submission(&pool);
        let app = admin_app!(pool, blog);
        let mut browser = Browser { cookie: None };

        let resp = test::call_service(&app, test::TestRequest::post().uri("/test_login").to_request()).await;
        browser.remember(&resp);

        let delete_uri = format!("/management/desk/api/submissions/{}/delete", id);
        for expected_step in 1..=3 {
            let (status, body) = call!(app, browser, browser.post(&delete_uri));
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"]["deletion"]["step_index"], expected_step);
            assert_eq!(body["data"]["deleted"], false);
        }

        // Wrong phrase: rejected, still at step 3, nothing deleted.
        let req = browser.post(&delete_uri).set_json(json!({ "confirmation_text": "delete" }));
        let (status, body) = call!(app, browser, req);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["deletion"]["step_index"], 3);
        assert_eq!(pool.get().unwrap().query_row("SELECT COUNT(*) FROM submissions", [], |r| r.get::<_, i64>(0)).unwrap(), 1);

        let req = browser
            .post("/management/desk/api/submissions/confirmation")
            .set_json(json!({ "text": "Delete Consent Records" }));
        let (status, _) = call!(app, browser, req);
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call!(app, browser, browser.post(&delete_uri));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], true);
        assert_eq!(body["data"]["deletion"]["step_index"], 0);
        assert_eq!(body["data"]["overview"]["pending_count"], 0);

        let (_, body) = call!(app, browser, browser.get("/management/desk/api/submissions"));
        assert_eq!(body["data"]["overview"]["pending_count"], 0);
        assert_eq!(body["data"]["deletion"]["step"], "idle");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[actix_web::test]
    async fn deletion_is_reported_even_when_the_reload_fails() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let blog = Arc::new(db);
        let id = seed_submission(&pool);
        // A row with an unparseable timestamp makes every later listing fail.
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO submissions (id, name, email, story, consent_version, approved, created_at)
                 VALUES ('broken', 'X', 'x@example.org', 'x', '2024-01', 0, 'not-a-date')",
                [],
            )
            .unwrap();
        let app = admin_app!(pool, blog);
        let mut browser = Browser { cookie: None };
        let resp = test::call_service(&app, test::TestRequest::post().uri("/test_login").to_request()).await;
        browser.remember(&resp);

        let delete_uri = format!("/management/desk/api/submissions/{}/delete", id);
        for _ in 0..3 {
            call!(app, browser, browser.post(&delete_uri));
        }
        let req = browser
            .post(&delete_uri)
            .set_json(json!({ "confirmation_text": "delete consent records" }));
        let (status, body) = call!(app, browser, req);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["deleted"], true);
        assert!(body["data"]["overview"].is_null());
        assert!(body["error"].as_str().unwrap().contains("could not be reloaded"));
        assert_eq!(body["data"]["deletion"]["step_index"], 0);

        let remaining: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM submissions WHERE id = ?1", [&id], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[actix_web::test]
    async fn settings_form_rejects_an_unbounded_upload_size() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let blog = Arc::new(db);
        let app = admin_app!(pool, blog);
        let mut browser = Browser { cookie: None };
        let resp = test::call_service(&app, test::TestRequest::post().uri("/test_login").to_request()).await;
        browser.remember(&resp);

        let req = browser
            .post("/management/desk/update_settings")
            .insert_header(("content-type", "application/x-www-form-urlencoded"))
            .set_payload("max_file_upload_size_mb=18446744073709551615&allowed_mime_types=image%2Fpng&consent_policy_version=2025-01")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let settings = admin_helpers::load_settings(&pool).unwrap();
        assert_ne!(settings.max_file_upload_size_mb, "18446744073709551615");
        assert_ne!(settings.consent_policy_version, "2025-01");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[actix_web::test]
    async fn cancel_resets_and_anonymous_requests_are_refused() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let blog = Arc::new(db);
        let id = seed_submission(&pool);
        let app = admin_app!(pool, blog);
        let mut browser = Browser { cookie: None };

        let delete_uri = format!("/management/desk/api/submissions/{}/delete", id);
        let resp = test::call_service(&app, browser.post(&delete_uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = test::call_service(&app, test::TestRequest::post().uri("/test_login").to_request()).await;
        browser.remember(&resp);

        call!(app, browser, browser.post(&delete_uri));
        let (_, body) = call!(app, browser, browser.post(&delete_uri));
        assert_eq!(body["data"]["deletion"]["step_index"], 2);

        let (status, body) = call!(app, browser, browser.post("/management/desk/api/submissions/delete/cancel"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deletion"]["step_index"], 0);
        assert_eq!(body["data"]["deletion"]["typed_text"], "");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[actix_web::test]
    async fn approve_moves_a_submission_between_partitions() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let blog = Arc::new(db);
        let id = seed_submission(&pool);
        let app = admin_app!(pool, blog);
        let mut browser = Browser { cookie: None };
        let resp = test::call_service(&app, test::TestRequest::post().uri("/test_login").to_request()).await;
        browser.remember(&resp);

        let uri = format!("/management/desk/api/submissions/{}/approve", id);
        let (status, body) = call!(app, browser, browser.post(&uri));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["overview"]["pending_count"], 0);
        assert_eq!(body["data"]["overview"]["approved_count"], 1);

        let (status, _) = call!(app, browser, browser.post("/management/desk/api/submissions/ghost/approve"));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[actix_web::test]
    async fn inline_tag_editor_round_trip() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let blog = Arc::new(db);
        let app = admin_app!(pool, blog);
        let mut browser = Browser { cookie: None };
        let resp = test::call_service(&app, test::TestRequest::post().uri("/test_login").to_request()).await;
        browser.remember(&resp);

        // Saving before choosing a row is a validation error.
        let req = browser.post("/management/desk/api/tags/save").set_json(json!({ "name": "Heat" }));
        let (status, _) = call!(app, browser, req);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = browser.post("/management/desk/api/tags/edit").set_json(json!({ "target": "new" }));
        let (_, body) = call!(app, browser, req);
        assert_eq!(body["data"]["editor"]["editing"], "new");

        let req = browser.post("/management/desk/api/tags/save").set_json(json!({ "name": "  " }));
        let (status, body) = call!(app, browser, req);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["editor"]["editing"], "new");

        let req = browser.post("/management/desk/api/tags/save").set_json(json!({ "name": "Heat" }));
        let (status, body) = call!(app, browser, req);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["records"][0]["name"], "Heat");
        assert!(body["data"]["editor"]["editing"].is_null());

        let tag_id = body["data"]["records"][0]["id"].as_str().unwrap().to_string();
        let delete_uri = format!("/management/desk/api/tags/{}/delete", tag_id);
        let (_, body) = call!(app, browser, browser.post(&delete_uri));
        assert_eq!(body["data"]["deleted"], false);
        let (_, body) = call!(app, browser, browser.post(&delete_uri));
        assert_eq!(body["data"]["deleted"], true);
        assert_eq!(body["data"]["records"].as_array().unwrap().len(), 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[actix_web::test]
    async fn stories_with_coordinates_skip_the_geocoder() {
        let pool = content_pool();
        let (db, dir) = blog_db();
        let blog = Arc::new(db);
        let app = admin_app!(pool, blog);
        let mut browser = Browser { cookie: None };
        let resp = test::call_service(&app, test::TestRequest::post().uri("/test_login").to_request()).await;
        browser.remember(&resp);

        let req = browser.post("/management/desk/api/stories/edit").set_json(json!({ "target": "new" }));
        call!(app, browser, req);
        let req = browser.post("/management/desk/api/stories/save").set_json(json!({
            "title": "Mangroves",
            "location": "Lamu",
            "latitude": -2.27,
            "longitude": 40.9,
        }));
        let (status, body) = call!(app, browser, req);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["records"][0]["latitude"], -2.27);
        let _ = std::fs::remove_dir_all(dir);
    }
}
