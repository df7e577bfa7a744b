use serde::{Deserialize, Serialize};

/// On-disk layout: `{"users": [...]}`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Document {
    pub users: Vec<User>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub movies: Vec<Movie>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: u64,
    pub name: String,
    pub director: String,
    pub year: i32,
    pub rating: f64,
}

/// Movie fields as produced by a lookup, before an id is assigned.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieDescriptor {
    pub name: String,
    pub director: String,
    pub year: i32,
    pub rating: f64,
}

impl MovieDescriptor {
    pub fn into_movie(self, id: u64) -> Movie {
        Movie {
            id,
            name: self.name,
            director: self.director,
            year: self.year,
            rating: self.rating,
        }
    }
}

/// Partial movie update. Absent fields keep their stored value.
///
/// `name` is the canonical title field; `title` is accepted as an alias on input.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct MovieUpdate {
    #[serde(default, alias = "title", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl Movie {
    /// Shallow merge: overwrite only the fields present in `update`.
    pub fn apply(&mut self, update: MovieUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(director) = update.director {
            self.director = director;
        }
        if let Some(year) = update.year {
            self.year = year;
        }
        if let Some(rating) = update.rating {
            self.rating = rating;
        }
    }
}
