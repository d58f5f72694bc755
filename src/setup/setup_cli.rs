use clap::{Parser, Subcommand};
use climate_stories_backend::config::Config;
use climate_stories_backend::models::db_operations::users_db_operations::{self, ROLE_ADMIN};
use climate_stories_backend::setup::db_setup;
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the `content` and/or `blog` database. Both when omitted.
    Setup { db_type: Option<String> },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("content") => setup_content_database(&config),
                Some("blog") => setup_blog_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'content' or 'blog'.", other),
                None => {
                    setup_content_database(&config);
                    setup_blog_database(&config);
                }
            },
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { username, password } => create_admin_user(&config, username, password),
            AdminAction::List => list_admin_users(&config),
            AdminAction::ChangePassword { username, new_password } => {
                change_admin_password(&config, username, new_password)
            }
        },
    }
}

fn ensure_parent_dir(db_path: &Path) -> bool {
    match db_path.parent().map(fs::create_dir_all) {
        Some(Err(e)) => {
            eprintln!("❌ Error: Could not create database directory for '{}': {}", db_path.display(), e);
            false
        }
        _ => true,
    }
}

fn setup_content_database(config: &Config) {
    let db_path = config.content_db_path();
    if db_path.exists() {
        println!("ℹ️ Content database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up content database at '{}'...", db_path.display());
    if !ensure_parent_dir(&db_path) {
        return;
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Error creating content database file: {}", e);
            return;
        }
    };
    match db_setup::setup_content_db(&mut conn) {
        Ok(_) => println!("✅ Content database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up content database: {}", e),
    }
}

fn setup_blog_database(config: &Config) {
    let db_path = config.blog_db_path();
    if db_path.exists() {
        println!("ℹ️ Blog database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up blog database at '{}'...", db_path.display());
    if !ensure_parent_dir(&db_path) {
        return;
    }

    let db = match Database::create(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Error creating blog database file: {}", e);
            return;
        }
    };
    match db_setup::setup_blog_db(&db) {
        Ok(_) => println!("✅ Blog database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up blog database: {}", e),
    }
}

fn open_content_db(config: &Config) -> Option<Connection> {
    let db_path = config.content_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Content database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Error opening content database: {}", e);
            None
        }
    }
}

fn create_admin_user(config: &Config, username: &str, password: &str) {
    let Some(conn) = open_content_db(config) else { return };
    match users_db_operations::create_user(&conn, username, password, ROLE_ADMIN) {
        Ok(_) => println!("✅ Admin user '{}' created successfully.", username),
        Err(e) => eprintln!("❌ Error creating admin user: {}. It might be because the username already exists.", e),
    }
}

fn list_admin_users(config: &Config) {
    let Some(conn) = open_content_db(config) else { return };
    match users_db_operations::read_users_by_role(&conn, ROLE_ADMIN) {
        Ok(users) => {
            println!("Listing Admin Users:");
            for user in users {
                let last_login = user.last_login_time.as_deref().unwrap_or("never");
                let status = if user.is_active { "active" } else { "suspended" };
                println!("- {} ({}, last login: {})", user.username, status, last_login);
            }
        }
        Err(e) => eprintln!("❌ Error fetching admins: {}", e),
    }
}

fn change_admin_password(config: &Config, username: &str, new_password: &str) {
    let Some(conn) = open_content_db(config) else { return };
    let is_admin = match users_db_operations::read_users_by_role(&conn, ROLE_ADMIN) {
        Ok(admins) => admins.iter().any(|u| u.username == username),
        Err(e) => {
            eprintln!("❌ Error fetching admins: {}", e);
            return;
        }
    };
    if !is_admin {
        eprintln!("❌ Error: No admin user named '{}' found.", username);
        return;
    }
    match users_db_operations::change_password(&conn, username, new_password) {
        Ok(0) => eprintln!("❌ Error: No admin user named '{}' found.", username),
        Ok(_) => println!("✅ Password for admin user '{}' changed successfully.", username),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}
