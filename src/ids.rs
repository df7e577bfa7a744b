//! Identifier normalization.
//!
//! User ids are stored as strings and movie ids as integers, but callers hold
//! either form (path segments, form fields, values read back from the store).
//! Every `MovieDb` method funnels its arguments through here.

use crate::error::{Error, Result};

pub type MovieId = u64;

pub trait AsUserId {
    fn as_user_id(&self) -> String;
}

pub trait AsMovieId {
    fn as_movie_id(&self) -> Result<MovieId>;
}

impl AsUserId for &str {
    fn as_user_id(&self) -> String {
        (*self).to_owned()
    }
}

impl AsUserId for String {
    fn as_user_id(&self) -> String {
        self.clone()
    }
}

impl AsUserId for &String {
    fn as_user_id(&self) -> String {
        (*self).clone()
    }
}

impl AsMovieId for &str {
    fn as_movie_id(&self) -> Result<MovieId> {
        self.trim()
            .parse()
            .map_err(|_| Error::InvalidMovieId((*self).to_owned()))
    }
}

impl AsMovieId for String {
    fn as_movie_id(&self) -> Result<MovieId> {
        self.as_str().as_movie_id()
    }
}

impl AsMovieId for &String {
    fn as_movie_id(&self) -> Result<MovieId> {
        self.as_str().as_movie_id()
    }
}

macro_rules! integer_ids {
    ($($t:ty),*) => {$(
        impl AsUserId for $t {
            fn as_user_id(&self) -> String {
                self.to_string()
            }
        }

        impl AsMovieId for $t {
            fn as_movie_id(&self) -> Result<MovieId> {
                MovieId::try_from(*self).map_err(|_| Error::InvalidMovieId(self.to_string()))
            }
        }
    )*};
}

integer_ids!(u32, u64, usize, i32, i64);

pub fn normalize_ids(user_id: impl AsUserId, movie_id: impl AsMovieId) -> Result<(String, MovieId)> {
    Ok((user_id.as_user_id(), movie_id.as_movie_id()?))
}
