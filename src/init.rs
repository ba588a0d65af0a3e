use crate::app::{init_tracing, ServerError};
use crate::auth::PasswordScheme;
use crate::settings::Settings;
use crate::store::{self, UserRepository, SqliteStore};

/// Creates the database file if needed and runs the migrations, which seed
/// the administrator row.
pub async fn init_database() -> Result<(), ServerError> {
    let settings = Settings::new()?;
    init_tracing(&settings);

    let pool = store::connect(
        &settings.database.url,
        settings.database.max_connections,
        true,
    )
    .await?;
    store::migrate(&pool).await?;
    tracing::info!("database ready at {}", settings.database.url);
    Ok(())
}

/// Prompts twice for a password and stores it for the administrator.
pub async fn set_admin_password() -> Result<(), ServerError> {
    let settings = Settings::new()?;
    init_tracing(&settings);

    let pool = store::connect(
        &settings.database.url,
        settings.database.max_connections,
        false,
    )
    .await?;
    store::migrate(&pool).await?;
    let store = SqliteStore::new(pool);

    let password = rpassword::prompt_password("Admin password: ")?;
    let confirmation = rpassword::prompt_password("Repeat password: ")?;
    if password != confirmation {
        println!("Passwords don't match, nothing changed.");
        return Ok(());
    }

    let scheme = PasswordScheme::new(&settings.auth.hashing)?;
    let password_hash = scheme.hash(&password)?;
    if store
        .update_password_hash(settings.auth.admin_id, &password_hash)
        .await?
    {
        println!("Administrator password set.");
    } else {
        println!("No user with id {}.", settings.auth.admin_id);
    }
    Ok(())
}
