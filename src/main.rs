mod config;
mod database;
mod error;
mod ids;
mod model;
mod omdb;

use actix_web::{error as web_error, http::StatusCode, middleware::Logger, web, App, HttpResponse, HttpServer};
use config::Config;
use database::*;
use ids::AsMovieId;
use log::{debug, info};
use model::*;
use omdb::{add_movie_by_title, MovieLookup, OmdbClient};
use serde::Deserialize;
use std::io;
use std::sync::Arc;

type Tera = web::Data<tera::Tera>;
type Db = web::Data<JsonStore>;
type Lookup = web::Data<dyn MovieLookup + Send + Sync>;

fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> web_error::Error {
    debug!("{:?}", err);
    web_error::ErrorInternalServerError(message)
}

fn render(tera: &tera::Tera, template: &str, ctx: &tera::Context) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render(template, ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok().content_type("text/html").body(body))
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("location", location))
        .finish()
}

async fn index(tera: Tera) -> actix_web::Result<HttpResponse> {
    render(&tera, "home.html", &tera::Context::new())
}

async fn not_found(tera: Tera) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render("404.html", &tera::Context::new())
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::build(StatusCode::NOT_FOUND)
        .content_type("text/html")
        .body(body))
}

async fn list_users(tera: Tera, db: Db) -> actix_web::Result<HttpResponse> {
    let users = db
        .list_all_users()
        .map_err(|err| log_error(err, "Database error"))?;
    let mut ctx = tera::Context::new();
    ctx.insert("users", &users);
    render(&tera, "users.html", &ctx)
}

async fn user_movies(
    path: web::Path<String>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let user_id = path.into_inner();
    let movies = db
        .get_user_movies(&user_id)
        .map_err(|err| log_error(err, "Database error"))?;
    let mut ctx = tera::Context::new();
    ctx.insert("user_id", &user_id);
    ctx.insert("movies", &movies);
    render(&tera, "user_movies.html", &ctx)
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

async fn add_user(tera: Tera) -> actix_web::Result<HttpResponse> {
    render(&tera, "add_user.html", &tera::Context::new())
}

async fn add_user_post(
    params: web::Form<NameParams>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    match db.add_user(&params.name) {
        Ok(user) => Ok(redirect(format!("/users/{}", user.user_id))),
        Err(err) if err.is_domain() => {
            let mut ctx = tera::Context::new();
            ctx.insert("error_message", &err.to_string());
            render(&tera, "add_user.html", &ctx)
        }
        Err(err) => Err(log_error(err, "Database error")),
    }
}

async fn add_movie(path: web::Path<String>, tera: Tera) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("user_id", &path.into_inner());
    render(&tera, "add_movie.html", &ctx)
}

async fn add_movie_post(
    path: web::Path<String>,
    params: web::Form<NameParams>,
    tera: Tera,
    db: Db,
    lookup: Lookup,
) -> actix_web::Result<HttpResponse> {
    let user_id = path.into_inner();
    let title = params.into_inner().name;
    let result = web::block({
        let user_id = user_id.clone();
        move || add_movie_by_title(db.get_ref(), lookup.get_ref(), user_id, &title)
    })
    .await
    .map_err(|err| log_error(err, "Worker error"))?;
    match result {
        Ok(_) => Ok(redirect(format!("/users/{}", user_id))),
        Err(err) if err.is_domain() => {
            let mut ctx = tera::Context::new();
            ctx.insert("user_id", &user_id);
            ctx.insert("error_message", &err.to_string());
            render(&tera, "add_movie.html", &ctx)
        }
        Err(err) => Err(log_error(err, "Database error")),
    }
}

/// Update form fields. Blank fields leave the stored value alone.
#[derive(Deserialize)]
struct UpdateParams {
    name: Option<String>,
    director: Option<String>,
    year: Option<String>,
    rating: Option<String>,
}

fn non_blank(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

impl UpdateParams {
    fn into_update(self) -> Result<MovieUpdate, &'static str> {
        let year = match non_blank(self.year) {
            Some(year) => Some(year.trim().parse().map_err(|_| "Year must be a whole number.")?),
            None => None,
        };
        let rating = match non_blank(self.rating) {
            Some(rating) => Some(rating.trim().parse().map_err(|_| "Rating must be a number.")?),
            None => None,
        };
        Ok(MovieUpdate {
            name: non_blank(self.name),
            director: non_blank(self.director),
            year,
            rating,
        })
    }
}

async fn update_movie(
    path: web::Path<(String, String)>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let (user_id, movie_id) = path.into_inner();
    let movie_id = match movie_id.as_movie_id() {
        Ok(movie_id) => movie_id,
        Err(_) => return not_found(tera).await,
    };
    let movie = match db
        .get_movie(&user_id, movie_id)
        .map_err(|err| log_error(err, "Database error"))?
    {
        Some(movie) => movie,
        None => return not_found(tera).await,
    };
    let mut ctx = tera::Context::new();
    ctx.insert("user_id", &user_id);
    ctx.insert("movie", &movie);
    render(&tera, "update_movie.html", &ctx)
}

async fn update_movie_post(
    path: web::Path<(String, String)>,
    params: web::Form<UpdateParams>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let (user_id, movie_id) = path.into_inner();
    let movie_id = match movie_id.as_movie_id() {
        Ok(movie_id) => movie_id,
        Err(_) => return not_found(tera).await,
    };
    match params.into_inner().into_update() {
        Ok(update) => {
            db.update_movie(&user_id, movie_id, update)
                .map_err(|err| log_error(err, "Database error"))?;
            Ok(redirect(format!("/users/{}", user_id)))
        }
        Err(message) => {
            let movie = db
                .get_movie(&user_id, movie_id)
                .map_err(|err| log_error(err, "Database error"))?;
            let mut ctx = tera::Context::new();
            ctx.insert("user_id", &user_id);
            ctx.insert("movie", &movie);
            ctx.insert("error_message", message);
            render(&tera, "update_movie.html", &ctx)
        }
    }
}

async fn delete_movie(
    path: web::Path<(String, String)>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let (user_id, movie_id) = path.into_inner();
    let movie_id = match movie_id.as_movie_id() {
        Ok(movie_id) => movie_id,
        Err(_) => return not_found(tera).await,
    };
    db.delete_movie(&user_id, movie_id)
        .map_err(|err| log_error(err, "Database error"))?;
    Ok(redirect(format!("/users/{}", user_id)))
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/users", web::get().to(list_users))
        .route("/users/{user_id}", web::get().to(user_movies))
        .route("/add_user", web::get().to(add_user))
        .route("/add_user", web::post().to(add_user_post))
        .route("/users/{user_id}/add_movie", web::get().to(add_movie))
        .route("/users/{user_id}/add_movie", web::post().to(add_movie_post))
        .route(
            "/users/{user_id}/update_movie/{movie_id}",
            web::get().to(update_movie),
        )
        .route(
            "/users/{user_id}/update_movie/{movie_id}",
            web::post().to(update_movie_post),
        )
        .route(
            "/users/{user_id}/delete_movie/{movie_id}",
            web::get().to(delete_movie),
        );
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(
        env_logger::Env::new().default_filter_or("movieweb=debug,actix_web=info"),
    );

    let config = Config::from_env()?;
    let tera = tera::Tera::new(&config.templates)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    let store = JsonStore::open(&config.data_file)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    info!("Using document {}", store.path().display());

    let tera = web::Data::new(tera);
    let db = web::Data::new(store);
    let lookup: Arc<dyn MovieLookup + Send + Sync> =
        Arc::new(OmdbClient::new(config.omdb_url, config.omdb_api_key));
    let lookup = Lookup::from(lookup);

    info!("Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(tera.clone())
            .app_data(db.clone())
            .app_data(lookup.clone())
            .configure(routes)
            .default_service(web::route().to(not_found))
    })
    .bind(config.bind.as_str())?
    .run()
    .await
}
