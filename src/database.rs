use crate::error::{Error, Result};
use crate::ids::{normalize_ids, AsMovieId, AsUserId, MovieId};
use crate::model::*;
use log::{debug, info};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Operations the web layer needs from a storage backend.
///
/// Lookups of unknown users or movies are not errors: reads come back empty
/// and mutations do nothing. `Err` is reserved for faults of the backend itself.
pub trait MovieDb {
    fn list_all_users(&self) -> Result<Vec<User>>;
    fn get_user_movies(&self, user_id: impl AsUserId) -> Result<Vec<Movie>>;
    /// Returns the id assigned to the new movie, or `None` if the user does not exist.
    fn add_movie(&self, user_id: impl AsUserId, movie: MovieDescriptor) -> Result<Option<MovieId>>;
    fn get_movie(&self, user_id: impl AsUserId, movie_id: impl AsMovieId) -> Result<Option<Movie>>;
    fn update_movie(
        &self,
        user_id: impl AsUserId,
        movie_id: impl AsMovieId,
        update: MovieUpdate,
    ) -> Result<()>;
    fn delete_movie(&self, user_id: impl AsUserId, movie_id: impl AsMovieId) -> Result<()>;
}

/// Whether a read-modify-write rewrites the document.
enum Commit<T> {
    Write(T),
    Discard(T),
}

/// A `MovieDb` stored as a single JSON document.
///
/// Every call reloads the whole file and every mutation rewrites it. The
/// rewrite goes through a temporary file in the same directory, so the path
/// always holds a complete document. Mutations within one process are
/// serialized; separate processes sharing a file are not.
pub struct JsonStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        JsonStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Like `new`, but starts an empty document if the file does not exist yet.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let store = Self::new(path);
        if !store.path.exists() {
            info!("Creating empty document at {}", store.path.display());
            store.write(&Document::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document> {
        let file = File::open(&self.path)?;
        let document: Document = serde_json::from_reader(BufReader::new(file))?;
        debug!("Loaded {} users from {}", document.users.len(), self.path.display());
        Ok(document)
    }

    fn write(&self, document: &Document) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, document)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        debug!("Wrote {} users to {}", document.users.len(), self.path.display());
        Ok(())
    }

    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<Commit<T>>,
    {
        let _guard = self.write_lock.lock();
        let mut document = self.load()?;
        match f(&mut document)? {
            Commit::Write(out) => {
                self.write(&document)?;
                Ok(out)
            }
            Commit::Discard(out) => Ok(out),
        }
    }

    /// Creates a user with the next sequential id.
    ///
    /// Fails with `Error::UserExists` if the name is taken, without touching the file.
    pub fn add_user(&self, name: &str) -> Result<User> {
        self.transact(|document| {
            if document.users.iter().any(|user| user.name == name) {
                return Err(Error::UserExists(name.to_owned()));
            }
            // Derived from the count; only unique while users are never removed.
            let user = User {
                user_id: (document.users.len() + 1).to_string(),
                name: name.to_owned(),
                movies: Vec::new(),
            };
            document.users.push(user.clone());
            info!("Added user {} ({})", user.user_id, user.name);
            Ok(Commit::Write(user))
        })
    }
}

fn find_user<'a>(users: &'a mut [User], user_id: &str) -> Option<&'a mut User> {
    users.iter_mut().find(|user| user.user_id == user_id)
}

fn next_movie_id(movies: &[Movie]) -> MovieId {
    movies.iter().map(|movie| movie.id).max().unwrap_or(0) + 1
}

impl MovieDb for JsonStore {
    fn list_all_users(&self) -> Result<Vec<User>> {
        Ok(self.load()?.users)
    }

    fn get_user_movies(&self, user_id: impl AsUserId) -> Result<Vec<Movie>> {
        let user_id = user_id.as_user_id();
        Ok(self
            .load()?
            .users
            .into_iter()
            .find(|user| user.user_id == user_id)
            .map(|user| user.movies)
            .unwrap_or_default())
    }

    fn add_movie(&self, user_id: impl AsUserId, movie: MovieDescriptor) -> Result<Option<MovieId>> {
        let user_id = user_id.as_user_id();
        // An unknown user still rewrites the unchanged document.
        self.transact(|document| {
            let id = find_user(&mut document.users, &user_id).map(|user| {
                let id = next_movie_id(&user.movies);
                info!("Adding movie {} {:?} to user {}", id, movie.name, user_id);
                user.movies.push(movie.into_movie(id));
                id
            });
            Ok(Commit::Write(id))
        })
    }

    fn get_movie(&self, user_id: impl AsUserId, movie_id: impl AsMovieId) -> Result<Option<Movie>> {
        let (user_id, movie_id) = normalize_ids(user_id, movie_id)?;
        Ok(self
            .load()?
            .users
            .into_iter()
            .find(|user| user.user_id == user_id)
            .and_then(|user| user.movies.into_iter().find(|movie| movie.id == movie_id)))
    }

    fn update_movie(
        &self,
        user_id: impl AsUserId,
        movie_id: impl AsMovieId,
        update: MovieUpdate,
    ) -> Result<()> {
        let (user_id, movie_id) = normalize_ids(user_id, movie_id)?;
        self.transact(|document| {
            let movie = find_user(&mut document.users, &user_id)
                .and_then(|user| user.movies.iter_mut().find(|movie| movie.id == movie_id));
            match movie {
                Some(movie) => {
                    movie.apply(update);
                    Ok(Commit::Write(()))
                }
                None => {
                    debug!("No movie {} for user {}, nothing to update", movie_id, user_id);
                    Ok(Commit::Discard(()))
                }
            }
        })
    }

    fn delete_movie(&self, user_id: impl AsUserId, movie_id: impl AsMovieId) -> Result<()> {
        let (user_id, movie_id) = normalize_ids(user_id, movie_id)?;
        self.transact(|document| {
            if let Some(user) = find_user(&mut document.users, &user_id) {
                let before = user.movies.len();
                user.movies.retain(|movie| movie.id != movie_id);
                if user.movies.len() < before {
                    info!("Deleted movie {} of user {}", movie_id, user_id);
                }
            }
            Ok(Commit::Write(()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("movies.json")).unwrap();
        (dir, store)
    }

    fn descriptor(name: &str) -> MovieDescriptor {
        MovieDescriptor {
            name: name.to_owned(),
            director: "Christopher Nolan".to_owned(),
            year: 2010,
            rating: 8.8,
        }
    }

    #[test]
    fn open_creates_empty_document() {
        let (_dir, store) = store();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), r#"{"users":[]}"#);
        assert!(store.list_all_users().unwrap().is_empty());
    }

    #[test]
    fn add_user_assigns_sequential_ids() {
        let (_dir, store) = store();
        assert_eq!(store.add_user("Alice").unwrap().user_id, "1");
        assert_eq!(store.add_user("Bob").unwrap().user_id, "2");
        let names: Vec<_> = store
            .list_all_users()
            .unwrap()
            .into_iter()
            .map(|user| user.name)
            .collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn duplicate_user_name_is_rejected() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let err = store.add_user("Alice").unwrap_err();
        assert!(matches!(err, Error::UserExists(ref name) if name == "Alice"));
        assert!(err.is_domain());
        assert_eq!(store.list_all_users().unwrap().len(), 1);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn movie_ids_are_max_plus_one_and_reused() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        assert_eq!(store.add_movie("1", descriptor("A")).unwrap(), Some(1));
        assert_eq!(store.add_movie("1", descriptor("B")).unwrap(), Some(2));
        assert_eq!(store.add_movie(1u64, descriptor("C")).unwrap(), Some(3));

        store.delete_movie("1", 1u64).unwrap();
        assert_eq!(store.add_movie("1", descriptor("D")).unwrap(), Some(4));

        // Deleting the highest id frees it for the next insert.
        store.delete_movie("1", 4u64).unwrap();
        assert_eq!(store.add_movie("1", descriptor("E")).unwrap(), Some(4));

        let ids: Vec<_> = store
            .get_user_movies("1")
            .unwrap()
            .iter()
            .map(|movie| movie.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn movie_ids_are_per_user() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        store.add_user("Bob").unwrap();
        assert_eq!(store.add_movie("1", descriptor("A")).unwrap(), Some(1));
        assert_eq!(store.add_movie("2", descriptor("B")).unwrap(), Some(1));
    }

    #[test]
    fn add_movie_to_unknown_user_is_a_silent_no_op() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        fs::write(store.path(), r#"{ "users": [ {"user_id": "1", "name": "Alice", "movies": []} ] }"#)
            .unwrap();

        assert_eq!(store.add_movie("42", descriptor("A")).unwrap(), None);
        assert!(store.get_user_movies("1").unwrap().is_empty());
        // The unchanged document is still rewritten in compact form.
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            r#"{"users":[{"user_id":"1","name":"Alice","movies":[]}]}"#
        );
    }

    #[test]
    fn delete_for_unknown_user_still_rewrites() {
        let (_dir, store) = store();
        fs::write(store.path(), r#"{ "users": [ {"user_id": "1", "name": "Alice", "movies": []} ] }"#)
            .unwrap();

        store.delete_movie("42", 1u64).unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            r#"{"users":[{"user_id":"1","name":"Alice","movies":[]}]}"#
        );
    }

    #[test]
    fn delete_of_unknown_movie_keeps_the_others() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        store.add_movie("1", descriptor("A")).unwrap();
        store.add_movie("1", descriptor("B")).unwrap();

        store.delete_movie("1", 9u64).unwrap();
        let ids: Vec<_> = store
            .get_user_movies("1")
            .unwrap()
            .iter()
            .map(|movie| movie.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn unknown_user_has_no_movies() {
        let (_dir, store) = store();
        assert!(store.get_user_movies("nobody").unwrap().is_empty());
        assert_eq!(store.get_movie("nobody", 1u64).unwrap(), None);
    }

    #[test]
    fn round_trip_through_disk() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        store.add_movie("1", descriptor("Inception")).unwrap();

        let reopened = JsonStore::new(store.path());
        let users = reopened.list_all_users().unwrap();
        assert_eq!(
            users,
            vec![User {
                user_id: "1".to_owned(),
                name: "Alice".to_owned(),
                movies: vec![descriptor("Inception").into_movie(1)],
            }]
        );
    }

    #[test]
    fn update_is_a_partial_merge() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        store.add_movie("1", descriptor("Inception")).unwrap();

        store
            .update_movie(
                "1",
                "1",
                MovieUpdate {
                    rating: Some(9.5),
                    ..Default::default()
                },
            )
            .unwrap();

        let movie = store.get_movie(1u64, 1u64).unwrap().unwrap();
        assert_eq!(movie.rating, 9.5);
        assert_eq!(movie.director, "Christopher Nolan");
        assert_eq!(movie.year, 2010);
        assert_eq!(movie.name, "Inception");
    }

    #[test]
    fn update_of_missing_movie_does_not_write() {
        let (_dir, store) = store();
        fs::write(store.path(), r#"{"users": [{"user_id": "1", "name": "Alice", "movies": []}]}"#)
            .unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        store
            .update_movie("1", 9u64, MovieUpdate { year: Some(1999), ..Default::default() })
            .unwrap();
        store
            .update_movie("7", 1u64, MovieUpdate { year: Some(1999), ..Default::default() })
            .unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn delete_twice_is_safe_and_still_rewrites() {
        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        store.add_movie("1", descriptor("Inception")).unwrap();

        store.delete_movie("1", 1u64).unwrap();
        // Reformat the file by hand; a rewrite puts it back in compact form.
        fs::write(store.path(), r#"{ "users": [ {"user_id": "1", "name": "Alice", "movies": []} ] }"#)
            .unwrap();
        store.delete_movie("1", 1u64).unwrap();

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            r#"{"users":[{"user_id":"1","name":"Alice","movies":[]}]}"#
        );
    }

    #[test]
    fn invalid_movie_id_is_an_error() {
        let (_dir, store) = store();
        assert!(matches!(store.get_movie("1", "abc"), Err(Error::InvalidMovieId(_))));
        assert!(matches!(store.delete_movie("1", "abc"), Err(Error::InvalidMovieId(_))));
    }

    #[test]
    fn malformed_document_is_fatal() {
        let (_dir, store) = store();
        fs::write(store.path(), "{not json").unwrap();
        let err = store.list_all_users().unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(!err.is_domain());

        fs::write(store.path(), r#"{"people": []}"#).unwrap();
        assert!(matches!(store.add_user("Alice"), Err(Error::Json(_))));
    }

    #[test]
    fn missing_file_is_fatal_without_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.list_all_users(), Err(Error::Io(_))));
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        use std::sync::Arc;

        let (_dir, store) = store();
        store.add_user("Alice").unwrap();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.add_movie("1", descriptor(&format!("Movie {}", n))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let mut ids: Vec<_> = store
            .get_user_movies("1")
            .unwrap()
            .iter()
            .map(|movie| movie.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
    }
}
