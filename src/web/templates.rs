use actix_web::{HttpRequest, HttpResponse};
use once_cell::sync::Lazy;
use tera::{Context, Tera};
use tracing::error;

use super::flash;

pub static TEMPLATES: Lazy<Tera> = Lazy::new(|| {
    let mut tera = Tera::default();
    let added = tera.add_raw_templates(vec![
        ("base.html.tera", include_str!("../../templates/base.html.tera")),
        ("index.html.tera", include_str!("../../templates/index.html.tera")),
        ("receta.html.tera", include_str!("../../templates/receta.html.tera")),
        ("agregar.html.tera", include_str!("../../templates/agregar.html.tera")),
        ("editar.html.tera", include_str!("../../templates/editar.html.tera")),
        ("error.html.tera", include_str!("../../templates/error.html.tera")),
    ]);
    if let Err(e) = added {
        panic!("Failed to add templates: {e}");
    }
    tera.autoescape_on(vec![".html.tera"]);
    tera
});

/// Renders `name` with 200, consuming any pending flash notice.
pub fn render(req: &HttpRequest, name: &str, ctx: Context) -> HttpResponse {
    render_with(req, HttpResponse::Ok(), name, ctx)
}

pub fn render_with(
    req: &HttpRequest,
    mut builder: actix_web::HttpResponseBuilder,
    name: &str,
    mut ctx: Context,
) -> HttpResponse {
    let notice = flash::take(req);
    ctx.insert("flash", &notice);
    if notice.is_some() {
        builder.cookie(flash::removal());
    }

    match TEMPLATES.render(name, &ctx) {
        Ok(html) => builder.content_type("text/html; charset=utf-8").body(html),
        Err(e) => {
            error!(template = name, error = ?e, "failed to render template");
            HttpResponse::InternalServerError().body("template error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_templates_parse() {
        let names: Vec<&str> = TEMPLATES.get_template_names().collect();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn recipe_names_are_escaped() {
        let mut ctx = Context::new();
        ctx.insert("recetas", &vec!["<script>"]);
        ctx.insert("flash", &Option::<String>::None);
        let html = TEMPLATES.render("index.html.tera", &ctx).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
