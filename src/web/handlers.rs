use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use tera::Context;
use tracing::error;
use urlencoding::encode;

use super::flash::redirect;
use super::templates::{render, render_with};
use super::WebState;
use crate::error::RecipeError;
use crate::recipe::RecipeFields;
use crate::service::Notification;

const MISSING: &str = "❌ La receta no existe.";
const DUPLICATE: &str = "❌ Ya existe una receta con ese nombre.";
const BLANK_NAME: &str = "❌ El nombre de la receta no puede estar vacío.";
const ADDED: &str = "✅ Receta agregada exitosamente.";
const ADDED_WITHOUT_EMAIL: &str =
    "⚠️ Receta agregada, pero no se pudo programar el correo de confirmación.";
const UPDATED: &str = "✅ Receta actualizada exitosamente.";
const DELETED: &str = "✅ Receta eliminada exitosamente.";
const STORE_DOWN: &str =
    "No se pudo conectar con la base de datos de recetas. Inténtalo de nuevo más tarde.";

#[derive(Debug, Deserialize)]
pub struct NewRecipeForm {
    pub nombre: String,
    pub ingredientes: String,
    pub pasos: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct EditRecipeForm {
    pub ingredientes: String,
    pub pasos: String,
}

fn recipe_path(name: &str) -> String {
    format!("/receta/{}", encode(name))
}

/// Store outages get an explicit error page instead of a partial one.
fn unavailable(req: &HttpRequest, err: &RecipeError) -> HttpResponse {
    error!(error = %err, path = %req.path(), "record store unavailable");
    let mut ctx = Context::new();
    ctx.insert("message", STORE_DOWN);
    render_with(req, HttpResponse::ServiceUnavailable(), "error.html.tera", ctx)
}

/// Shared fallback for errors the handler does not recover from itself.
fn fail(req: &HttpRequest, err: RecipeError) -> HttpResponse {
    match err {
        RecipeError::NotFound(_) => redirect("/", MISSING),
        RecipeError::AlreadyExists(_) => redirect("/agregar", DUPLICATE),
        RecipeError::InvalidName => redirect("/agregar", BLANK_NAME),
        RecipeError::StoreUnavailable(_) => unavailable(req, &err),
    }
}

pub async fn index(req: HttpRequest, state: web::Data<WebState>) -> impl Responder {
    match state.recipes.list().await {
        Ok(names) => {
            let mut ctx = Context::new();
            ctx.insert("recetas", &names);
            render(&req, "index.html.tera", ctx)
        }
        Err(err) => fail(&req, err),
    }
}

pub async fn ver_receta(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<WebState>,
) -> impl Responder {
    match state.recipes.get(&path.into_inner()).await {
        Ok(recipe) => {
            let mut ctx = Context::new();
            ctx.insert("receta", &recipe);
            render(&req, "receta.html.tera", ctx)
        }
        Err(err) => fail(&req, err),
    }
}

pub async fn agregar_form(req: HttpRequest) -> impl Responder {
    render(&req, "agregar.html.tera", Context::new())
}

pub async fn agregar_receta(
    req: HttpRequest,
    form: web::Form<NewRecipeForm>,
    state: web::Data<WebState>,
) -> impl Responder {
    let form = form.into_inner();
    let fields = RecipeFields::new(form.ingredientes, form.pasos);
    match state.recipes.create(&form.nombre, fields, form.email.trim()).await {
        Ok(created) => match created.notification {
            Notification::Scheduled(_) => redirect("/", ADDED),
            Notification::NotScheduled(_) => redirect("/", ADDED_WITHOUT_EMAIL),
        },
        Err(err) => fail(&req, err),
    }
}

pub async fn editar_form(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<WebState>,
) -> impl Responder {
    match state.recipes.get(&path.into_inner()).await {
        Ok(recipe) => {
            let mut ctx = Context::new();
            ctx.insert("receta", &recipe);
            render(&req, "editar.html.tera", ctx)
        }
        Err(err) => fail(&req, err),
    }
}

pub async fn editar_receta(
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<EditRecipeForm>,
    state: web::Data<WebState>,
) -> impl Responder {
    let name = path.into_inner();
    let form = form.into_inner();
    match state
        .recipes
        .update(&name, RecipeFields::new(form.ingredientes, form.pasos))
        .await
    {
        Ok(()) => redirect(&recipe_path(&name), UPDATED),
        Err(err) => fail(&req, err),
    }
}

pub async fn eliminar_receta(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<WebState>,
) -> impl Responder {
    match state.recipes.delete(&path.into_inner()).await {
        Ok(()) => redirect("/", DELETED),
        Err(err) => fail(&req, err),
    }
}
