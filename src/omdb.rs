use crate::database::MovieDb;
use crate::error::{Error, Result};
use crate::ids::{AsUserId, MovieId};
use crate::model::MovieDescriptor;
use log::{debug, warn};
use serde::Deserialize;

pub const DEFAULT_OMDB_URL: &str = "http://www.omdbapi.com/";

/// Reason shown when the lookup failed for something other than an upstream "not found".
const LOOKUP_FAILED: &str = "Movie not found on OMDb";

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    /// The service answered but has no such movie. Holds its reason verbatim.
    #[error("{0}")]
    NotFound(String),
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unusable movie record: {0}")]
    Malformed(String),
}

/// Title to metadata lookup against some movie database.
pub trait MovieLookup {
    fn lookup(&self, title: &str) -> std::result::Result<MovieDescriptor, LookupError>;
}

pub struct OmdbClient {
    base_url: String,
    api_key: String,
}

impl OmdbClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        OmdbClient {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl MovieLookup for OmdbClient {
    /// Blocking request; keep it off the async executor.
    fn lookup(&self, title: &str) -> std::result::Result<MovieDescriptor, LookupError> {
        debug!("Looking up {:?} on {}", title, self.base_url);
        // OMDb reports misses and bad keys in the body, whatever the status code.
        let response: OmdbResponse = reqwest::blocking::Client::new()
            .get(&self.base_url)
            .query(&[("t", title), ("apikey", self.api_key.as_str())])
            .send()?
            .json()?;
        response.into_descriptor()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct OmdbResponse {
    response: String,
    error: Option<String>,
    title: Option<String>,
    director: Option<String>,
    year: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
}

impl OmdbResponse {
    fn into_descriptor(self) -> std::result::Result<MovieDescriptor, LookupError> {
        if self.response != "True" {
            return Err(LookupError::NotFound(
                self.error.unwrap_or_else(|| LOOKUP_FAILED.to_owned()),
            ));
        }
        let name = self
            .title
            .ok_or_else(|| LookupError::Malformed("missing Title".to_owned()))?;
        let year = self
            .year
            .as_deref()
            .and_then(parse_year)
            .ok_or_else(|| LookupError::Malformed(format!("bad Year {:?}", self.year)))?;
        let rating = match self.imdb_rating.as_deref() {
            None | Some("N/A") => 0.0,
            Some(rating) => rating
                .parse()
                .map_err(|_| LookupError::Malformed(format!("bad imdbRating {:?}", rating)))?,
        };
        Ok(MovieDescriptor {
            name,
            director: self.director.unwrap_or_default(),
            year,
            rating,
        })
    }
}

/// Series come back as ranges such as `2008–2013`; keep the first year.
fn parse_year(year: &str) -> Option<i32> {
    let digits: String = year.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Looks `title` up and adds the result to the user's movies.
///
/// An upstream miss becomes `Error::MovieNotFound` with the upstream reason;
/// transport and decoding failures are reported as a plain miss. Nothing is
/// written when the lookup fails.
pub fn add_movie_by_title<D, L>(
    db: &D,
    lookup: &L,
    user_id: impl AsUserId,
    title: &str,
) -> Result<Option<MovieId>>
where
    D: MovieDb,
    L: MovieLookup + ?Sized,
{
    let movie = match lookup.lookup(title) {
        Ok(movie) => movie,
        Err(LookupError::NotFound(reason)) => return Err(Error::MovieNotFound(reason)),
        Err(err) => {
            warn!("Lookup of {:?} failed: {}", title, err);
            return Err(Error::MovieNotFound(LOOKUP_FAILED.to_owned()));
        }
    };
    db.add_movie(user_id, movie)
}
