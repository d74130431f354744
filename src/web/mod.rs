//! HTML front end over [`RecipeService`].

pub mod flash;
pub mod handlers;
pub mod templates;

use actix_web::web;

use crate::service::RecipeService;

use self::handlers::{
    agregar_form, agregar_receta, editar_form, editar_receta, eliminar_receta, index, ver_receta,
};

pub struct WebState {
    pub recipes: RecipeService,
}

impl WebState {
    pub fn new(recipes: RecipeService) -> web::Data<Self> {
        web::Data::new(Self { recipes })
    }
}

pub fn recetario_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/receta/{nombre}").route(web::get().to(ver_receta)))
        .service(
            web::resource("/agregar")
                .route(web::get().to(agregar_form))
                .route(web::post().to(agregar_receta)),
        )
        .service(
            web::resource("/editar/{nombre}")
                .route(web::get().to(editar_form))
                .route(web::post().to(editar_receta)),
        )
        .service(web::resource("/eliminar/{nombre}").route(web::post().to(eliminar_receta)));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use async_trait::async_trait;

    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::error::{StoreError, StoreResult};
    use crate::queue::{InMemoryJobQueue, JobQueue, QueueSettings};
    use crate::recipe::RecipeFields;
    use crate::store::{InMemoryRecordStore, RecordStore};

    struct DownStore;

    fn refused() -> StoreError {
        StoreError::Unavailable(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )))
    }

    #[async_trait]
    impl RecordStore for DownStore {
        async fn exists(&self, _name: &str) -> StoreResult<bool> {
            Err(refused())
        }
        async fn get(&self, _name: &str) -> StoreResult<RecipeFields> {
            Err(refused())
        }
        async fn create(&self, _name: &str, _fields: &RecipeFields) -> StoreResult<()> {
            Err(refused())
        }
        async fn update(&self, _name: &str, _fields: &RecipeFields) -> StoreResult<()> {
            Err(refused())
        }
        async fn delete(&self, _name: &str) -> StoreResult<()> {
            Err(refused())
        }
        async fn list(&self) -> StoreResult<Vec<String>> {
            Err(refused())
        }
    }

    fn state_with(store: Arc<dyn RecordStore>) -> (web::Data<WebState>, Arc<InMemoryJobQueue>) {
        let queue = Arc::new(InMemoryJobQueue::new(QueueSettings::new("test")));
        let dispatcher = Dispatcher::new(queue.clone(), Duration::from_secs(1));
        (WebState::new(RecipeService::new(store, dispatcher)), queue)
    }

    fn location(resp: &actix_web::dev::ServiceResponse) -> String {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    fn tarta_form(email: &str) -> [(&'static str, String); 4] {
        [
            ("nombre", "Tarta".to_string()),
            ("ingredientes", "harina, huevos".to_string()),
            ("pasos", "mezclar, hornear".to_string()),
            ("email", email.to_string()),
        ]
    }

    #[actix_web::test]
    async fn add_redirects_home_and_enqueues_once() {
        let (state, queue) = state_with(Arc::new(InMemoryRecordStore::new()));
        let app = test::init_service(App::new().app_data(state).configure(recetario_routes)).await;

        let req = test::TestRequest::post()
            .uri("/agregar")
            .set_form(tarta_form("a@b.com"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/");

        let req = test::TestRequest::post()
            .uri("/agregar")
            .set_form(tarta_form("c@d.com"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/agregar");

        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[actix_web::test]
    async fn index_lists_recipes_and_shows_flash() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .create("Tarta", &RecipeFields::new("harina", "hornear"))
            .await
            .unwrap();
        let (state, _) = state_with(store);
        let app = test::init_service(App::new().app_data(state).configure(recetario_routes)).await;

        let redirected = flash::redirect("/", "✅ Receta agregada exitosamente.");
        let cookie = redirected.cookies().next().unwrap().into_owned();
        let req = test::TestRequest::get().uri("/").cookie(cookie).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("/receta/Tarta"));
        assert!(body.contains("Receta agregada exitosamente"));
    }

    #[actix_web::test]
    async fn missing_recipe_redirects_home() {
        let (state, _) = state_with(Arc::new(InMemoryRecordStore::new()));
        let app = test::init_service(App::new().app_data(state).configure(recetario_routes)).await;

        for req in [
            test::TestRequest::get().uri("/receta/Nada").to_request(),
            test::TestRequest::get().uri("/editar/Nada").to_request(),
            test::TestRequest::post().uri("/eliminar/Nada").to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&resp), "/");
        }
    }

    #[actix_web::test]
    async fn edit_redirects_to_encoded_recipe_page() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .create("Pan de muerto", &RecipeFields::new("harina", "hornear"))
            .await
            .unwrap();
        let (state, _) = state_with(store.clone());
        let app = test::init_service(App::new().app_data(state).configure(recetario_routes)).await;

        let req = test::TestRequest::post()
            .uri("/editar/Pan%20de%20muerto")
            .set_form([("ingredientes", "harina, azúcar"), ("pasos", "amasar")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/receta/Pan%20de%20muerto");
        assert_eq!(
            store.get("Pan de muerto").await.unwrap(),
            RecipeFields::new("harina, azúcar", "amasar")
        );
    }

    #[actix_web::test]
    async fn store_outage_is_an_explicit_error_page() {
        let (state, queue) = state_with(Arc::new(DownStore));
        let app = test::init_service(App::new().app_data(state).configure(recetario_routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = test::TestRequest::post()
            .uri("/agregar")
            .set_form(tarta_form("a@b.com"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(queue.stats().await.unwrap().pending, 0);
    }
}
