//! Request path to store key resolution

/// A normalized key for one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedKey {
    /// Cleaned key, always starting with `/`
    pub key: String,
    /// The key names a "directory" (ends with `/`)
    pub is_directory: bool,
}

impl ResolvedKey {
    /// The key as addressed in the store, without the leading `/`
    pub fn store_key(&self) -> &str {
        self.key.strip_prefix('/').unwrap_or(&self.key)
    }
}

/// Join `root` and a request path into a cleaned key.
///
/// `.` and empty segments are dropped. The request path is cleaned before
/// the root is applied, so `..` never climbs out of the root. A trailing `/`
/// on the request path survives cleaning, so `/docs/` stays a directory
/// request while `/docs` is an object fetch.
pub fn resolve(root: &str, request_path: &str) -> ResolvedKey {
    let wants_directory = request_path.ends_with('/');
    let mut key = clean(&format!("{root}/{}", clean(request_path)));
    if wants_directory && key != "/" {
        key.push('/');
    }
    ResolvedKey {
        is_directory: key.ends_with('/'),
        key,
    }
}

fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Join a directory key and a child name with exactly one `/` between them
pub fn join_key(directory: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if directory.is_empty() {
        name.to_string()
    } else if directory.ends_with('/') {
        format!("{directory}{name}")
    } else {
        format!("{directory}/{name}")
    }
}
