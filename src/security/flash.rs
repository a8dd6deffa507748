use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::services::Notice;

pub const FLASH_COOKIE: &str = "flash";
const SEPARATOR: char = '.';

/// Queues `notice` for the next rendered page.
pub fn push(jar: CookieJar, notice: Notice) -> CookieJar {
    let mut codes: Vec<&str> = jar
        .get(FLASH_COOKIE)
        .map(|cookie| cookie.value().split(SEPARATOR).collect())
        .unwrap_or_default();
    codes.push(notice.code());
    let value = codes.join(&SEPARATOR.to_string());

    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Drains the queued notices, returning their texts in the order they were pushed.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<&'static str>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, Vec::new());
    };

    let messages = cookie
        .value()
        .split(SEPARATOR)
        .filter_map(Notice::from_code)
        .map(|notice| notice.text())
        .collect();

    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), messages)
}
