//! Signup, login and profile lookup over the `users` table.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::auth::password;
use crate::auth::token::{IssuedToken, TokenSigner};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::User;

const USER_COLUMNS: &str =
    "id, fullname, handle, password_hash, mobile_number, date_of_birth, created_at";

#[derive(Debug, Clone)]
pub struct NewUser {
    pub fullname: String,
    pub handle: String,
    pub password: String,
    pub mobile_number: String,
    pub date_of_birth: String,
}

/// How a login identifier is resolved, decided by its shape alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Mobile(String),
    Handle(String),
}

impl LoginIdentifier {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if is_mobile_number(input) {
            LoginIdentifier::Mobile(input.to_string())
        } else {
            LoginIdentifier::Handle(input.to_string())
        }
    }
}

/// Exactly ten ASCII digits.
pub fn is_mobile_number(value: &str) -> bool {
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

pub fn signup(conn: &Connection, new_user: NewUser) -> AppResult<String> {
    let NewUser {
        fullname,
        handle,
        password,
        mobile_number,
        date_of_birth,
    } = new_user;
    let fullname = fullname.trim();
    let handle = handle.trim();
    let mobile_number = mobile_number.trim();
    let date_of_birth = date_of_birth.trim();

    if fullname.is_empty()
        || handle.is_empty()
        || password.is_empty()
        || mobile_number.is_empty()
        || date_of_birth.is_empty()
    {
        return Err(AppError::BadRequest(
            "fullname, handle, password, mobileNumber and dateOfBirth are required".into(),
        ));
    }
    if !is_mobile_number(mobile_number) {
        return Err(AppError::BadRequest(
            "Mobile number must be exactly 10 digits".into(),
        ));
    }
    if is_mobile_number(handle) {
        return Err(AppError::BadRequest(
            "Handle cannot be a 10 digit number".into(),
        ));
    }
    chrono::NaiveDate::parse_from_str(date_of_birth, "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest("Date of birth must be a valid YYYY-MM-DD date".into())
    })?;

    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE handle = ?1)",
        rusqlite::params![handle],
        |row| row.get(0),
    )?;
    if taken {
        return Err(AppError::BadRequest("Handle is already taken".into()));
    }

    let password_hash = password::hash_password(&password)?;
    let id = Uuid::new_v4().to_string();

    let result = conn.execute(
        "INSERT INTO users (id, fullname, handle, password_hash, mobile_number, date_of_birth, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![id, fullname, handle, password_hash, mobile_number, date_of_birth, db::now()],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // The handle check above races with concurrent signups; the
            // unique indexes are the final word for both columns.
            return Err(AppError::BadRequest(
                "Handle or mobile number is already registered".into(),
            ));
        }
        Err(e) => return Err(AppError::Database(e)),
    }

    tracing::info!(user_id = %id, handle, "User signed up");
    Ok(id)
}

pub fn find_for_login(conn: &Connection, identifier: &LoginIdentifier) -> AppResult<Option<User>> {
    let user = match identifier {
        LoginIdentifier::Mobile(mobile) => conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE mobile_number = ?1"),
                rusqlite::params![mobile],
                user_from_row,
            )
            .optional()?,
        LoginIdentifier::Handle(handle) => conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE handle = ?1"),
                rusqlite::params![handle],
                user_from_row,
            )
            .optional()?,
    };
    Ok(user)
}

/// Unknown identifiers and wrong passwords both fail with
/// [`AppError::InvalidCredentials`].
pub fn login(
    conn: &Connection,
    tokens: &TokenSigner,
    identifier: &str,
    password: &str,
) -> AppResult<IssuedToken> {
    if identifier.trim().is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "Please provide both username/mobile number and password".into(),
        ));
    }

    let identifier = LoginIdentifier::parse(identifier);
    let Some(user) = find_for_login(conn, &identifier)? else {
        tracing::debug!(?identifier, "Login for unknown identifier");
        return Err(AppError::InvalidCredentials);
    };

    if !password::verify_password(password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let issued = tokens.issue(&user.id)?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(issued)
}

pub fn get_user(conn: &Connection, user_id: &str) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        rusqlite::params![user_id],
        user_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("User not found".into()),
        e => AppError::Database(e),
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        fullname: row.get(1)?,
        handle: row.get(2)?,
        password_hash: row.get(3)?,
        mobile_number: row.get(4)?,
        date_of_birth: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
pub(crate) fn new_user(handle: &str, mobile: &str) -> NewUser {
    NewUser {
        fullname: format!("{handle} Example"),
        handle: handle.to_string(),
        password: "pw".to_string(),
        mobile_number: mobile.to_string(),
        date_of_birth: "2000-01-01".to_string(),
    }
}
