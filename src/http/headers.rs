//! # Headers HTTP
//! src/http/headers.rs
//!
//! Mapa de headers que conserva el orden de inserción y compara nombres
//! sin distinguir mayúsculas (`content-type` == `Content-Type`).

/// Nombres de headers usados por el núcleo
pub const CONNECTION: &str = "Connection";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const ACCEPT_ENCODING: &str = "Accept-Encoding";

/// Colección de headers HTTP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtiene el primer valor del header (sin distinguir mayúsculas)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Reemplaza cualquier valor previo del header
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(pos) => {
                self.entries[pos].1 = value.to_string();
                let mut i = pos + 1;
                while i < self.entries.len() {
                    if self.entries[i].0.eq_ignore_ascii_case(name) {
                        self.entries.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Agrega un valor sin reemplazar los existentes
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Elimina todas las ocurrencias del header
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_get() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
    }

    #[test]
    fn test_set_replaces_all_duplicates() {
        let mut headers = Headers::new();
        headers.append("X-A", "1");
        headers.append("x-a", "2");
        headers.set("X-a", "3");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-A"), Some("3"));
    }

    #[test]
    fn test_remove() {
        let mut headers = Headers::new();
        headers.set(CONTENT_LENGTH, "10");
        headers.remove("content-length");
        assert!(!headers.contains(CONTENT_LENGTH));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_preserves_order() {
        let mut headers = Headers::new();
        headers.set("B", "1");
        headers.set("A", "2");
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
