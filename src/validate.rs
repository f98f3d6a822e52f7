use crate::error::AppError;

pub fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Lower-cases the address and checks it looks like `local@domain.tld`.
pub fn email(value: &str) -> Result<String, AppError> {
    let email = required("email", value)?.to_lowercase();

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(AppError::BadRequest(format!("invalid email format: {value}")))
    }
}
