//! One-shot notices carried across a redirect in a cookie.

use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::utils::constants::FLASH_COOKIE;

fn cookie(message: &str) -> Cookie<'static> {
    Cookie::build(FLASH_COOKIE, URL_SAFE_NO_PAD.encode(message))
        .path("/")
        .http_only(true)
        .finish()
}

/// A cookie that deletes the flash on the client.
pub fn removal() -> Cookie<'static> {
    let mut cookie = Cookie::build(FLASH_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// 303 to `location`, leaving `message` for the next page.
pub fn redirect(location: &str, message: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .cookie(cookie(message))
        .finish()
}

pub fn take(req: &HttpRequest) -> Option<String> {
    let cookie = req.cookie(FLASH_COOKIE)?;
    let bytes = URL_SAFE_NO_PAD.decode(cookie.value()).ok()?;
    String::from_utf8(bytes).ok().filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn non_ascii_notice_survives_the_cookie() {
        let response = redirect("/", "✅ Receta agregada exitosamente.");
        let cookie = response.cookies().next().unwrap().into_owned();
        assert!(cookie.value().is_ascii());

        let req = TestRequest::default().cookie(cookie).to_http_request();
        assert_eq!(take(&req).as_deref(), Some("✅ Receta agregada exitosamente."));
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        let req = TestRequest::default()
            .cookie(Cookie::new(FLASH_COOKIE, "%%%"))
            .to_http_request();
        assert_eq!(take(&req), None);
    }
}
