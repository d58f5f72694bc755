use actix_cors::Cors;
use actix_csrf::CsrfMiddleware;
use actix_session::{storage::CookieSessionStore, SessionExt, SessionMiddleware};
use actix_web::{
    cookie::Key,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use climate_stories_backend::{
    config::Config,
    helper::admin_helpers,
    helper::entity_stores::{AdvisorStore, BlogStore, OrganisationStore, StoryStore, TagStore},
    helper::geocoding::NominatimGeocoder,
    middleware::{admin_guard, ip_guard},
    models::db_operations::connection_manager,
    routes, AppState,
};
use r2d2::Pool;
use rand::prelude::StdRng;
use redb::Database;
use std::convert::TryFrom;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tera::Tera;

async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "stories_server", author, version, about = "Starts the Climate Stories backend.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn build_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let tera = Tera::new("templates/**/*.html").expect("FATAL: Tera initialization failed");

    fs::create_dir_all(&config.media_path).expect("FATAL: Failed to create media directory");

    let blog_db = Arc::new(Database::open(config.blog_db_path()).expect(
        "FATAL: blog.db not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
    ));

    let content_db_path = config.content_db_path();
    if !content_db_path.exists() {
        panic!(
            "FATAL: content.db not found at '{}'. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
            content_db_path.display()
        );
    }
    let pool = Pool::builder()
        .build(connection_manager(&content_db_path))
        .expect("FATAL: Failed to create Rusqlite connection pool.");

    let initial_policy_version = {
        let conn = pool.get().expect("FATAL: Failed to get DB connection for initial setup.");
        admin_helpers::get_settings(&conn).consent_policy_version
    };
    log::info!("Submissions will be stamped with consent policy '{}'", initial_policy_version);
    let app_state = web::Data::new(AppState::new(initial_policy_version));

    let tag_store = web::Data::new(TagStore(pool.clone()));
    let story_store = web::Data::new(StoryStore(pool.clone()));
    let organisation_store = web::Data::new(OrganisationStore(pool.clone()));
    let advisor_store = web::Data::new(AdvisorStore(pool.clone()));
    let blog_store = web::Data::new(BlogStore(blog_db.clone()));
    let geocoder = web::Data::new(
        NominatimGeocoder::new(&config.geocoder_url, &config.geocoder_user_agent)
            .expect("FATAL: Failed to build the geocoder HTTP client."),
    );

    let session_key_bytes =
        hex::decode(&config.session_secret_key).expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .build();

        let admin_base_url = config.admin_base_url();

        App::new()
            .wrap(build_cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(tera.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(blog_db.clone()))
            .app_data(app_state.clone())
            .app_data(tag_store.clone())
            .app_data(story_store.clone())
            .app_data(organisation_store.clone())
            .app_data(advisor_store.clone())
            .app_data(blog_store.clone())
            .app_data(geocoder.clone())
            .configure(routes::public::config_api)
            .service(actix_files::Files::new("/media", &config.media_path))
            .route("/", web::get().to(root_handler))
            .service(
                web::scope("")
                    .wrap(session_mw)
                    .service(
                        web::scope(&admin_base_url)
                            .wrap(
                                CsrfMiddleware::<StdRng>::new()
                                    .set_cookie(actix_web::http::Method::GET, format!("{}/login", admin_base_url))
                                    .set_cookie(actix_web::http::Method::GET, format!("{}/dashboard", admin_base_url)),
                            )
                            .guard(actix_web::guard::fn_guard(ip_guard))
                            .configure(routes::admin::config_login)
                            .service(
                                web::scope("")
                                    .guard(actix_web::guard::fn_guard(|ctx| admin_guard(&ctx.get_session())))
                                    .configure(routes::admin::config_dashboard),
                            ),
                    ),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
