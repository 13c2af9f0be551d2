use crate::error::Error;
use crate::types::User;

/// Dev-only variant: every request is "authenticated" as whoever is running
/// the orchestrator process. Never select this in a multi-tenant deployment.
pub fn user_from_request() -> Result<Option<User>, Error> {
	let username = std::env::var("USER")
		.or_else(|_| std::env::var("USERNAME"))
		.unwrap_or_else(|_| "dev".to_string());
	Ok(Some(User {
		username,
		email: String::new(),
	}))
}
