const ACS_URL: &str = "ACS_URL";

const DEFAULT_ACS_URL: &str = "http://localhost:7557";

pub fn get_acs_url() -> String {
    std::env::var(ACS_URL).unwrap_or_else(|_| DEFAULT_ACS_URL.to_string())
}

const ACS_USERNAME: &str = "ACS_USERNAME";

pub fn get_acs_username() -> Option<String> {
    std::env::var(ACS_USERNAME).ok()
}

const ACS_PASSWORD: &str = "ACS_PASSWORD";

pub fn get_acs_password() -> Option<String> {
    std::env::var(ACS_PASSWORD).ok()
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub fn get_default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
