//! Multipart decoding shared by the endpoints that accept evidence files.
//!
//! Forms carry the JSON payload in a text field named `data`; every part with
//! a filename is treated as a file.

use axum::extract::Multipart;
use serde::de::DeserializeOwned;

use crate::errors::{AppError, AppResult};
use crate::upload::FilePart;

#[derive(Debug, Default)]
pub struct MultipartForm {
    texts: Vec<(String, String)>,
    files: Vec<(String, FilePart)>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| AppError::bad_request(format!("malformed multipart body: {err}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|err| AppError::bad_request(format!("cannot read file {name}: {err}")))?;
                    let part = FilePart {
                        bytes: bytes.to_vec(),
                        filename: Some(filename),
                    };
                    form.files.push((name, part));
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|err| AppError::bad_request(format!("cannot read field {name}: {err}")))?;
                    form.texts.push((name, text));
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Deserialize the JSON `data` field.
    pub fn data<T: DeserializeOwned>(&self) -> AppResult<T> {
        let raw = self
            .text("data")
            .ok_or_else(|| AppError::bad_request("missing form field: data"))?;
        parse_json(raw)
    }

    /// Like [`data`](Self::data), but an absent field yields the default.
    pub fn data_or_default<T: DeserializeOwned + Default>(&self) -> AppResult<T> {
        match self.text("data") {
            Some(raw) if !raw.trim().is_empty() => parse_json(raw),
            _ => Ok(T::default()),
        }
    }

    /// Remove and return every file sent under `name`, in upload order.
    pub fn take_files(&mut self, name: &str) -> Vec<FilePart> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(field, _)| field == name);
        self.files = rest;
        taken.into_iter().map(|(_, part)| part).collect()
    }

    pub fn take_file(&mut self, name: &str) -> Option<FilePart> {
        self.take_files(name).into_iter().next()
    }
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> AppResult<T> {
    serde_json::from_str(raw).map_err(|err| AppError::bad_request(format!("invalid data payload: {err}")))
}

/// Parse an id list sent either as a JSON array or as comma separated text.
pub fn parse_id_list(raw: Option<&str>) -> AppResult<Vec<i64>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };

    if raw.starts_with('[') {
        return serde_json::from_str::<Vec<i64>>(raw)
            .map_err(|err| AppError::bad_request(format!("invalid id list: {err}")));
    }

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::bad_request(format!("invalid id in list: {s}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_lists_accept_json_and_csv() {
        assert_eq!(parse_id_list(Some("[5, 8]")).unwrap(), vec![5, 8]);
        assert_eq!(parse_id_list(Some("5, 8,")).unwrap(), vec![5, 8]);
        assert!(parse_id_list(Some("  ")).unwrap().is_empty());
        assert!(parse_id_list(None).unwrap().is_empty());
    }

    #[test]
    fn id_lists_reject_garbage() {
        assert!(matches!(parse_id_list(Some("5,x")), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_id_list(Some("[5,")), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn files_are_taken_by_field_name() {
        let mut form = MultipartForm {
            texts: vec![],
            files: vec![
                ("initial_evidence".into(), FilePart::new(vec![1])),
                ("follow_up_evidence".into(), FilePart::new(vec![2])),
                ("initial_evidence".into(), FilePart::new(vec![3])),
            ],
        };
        let initial = form.take_files("initial_evidence");
        assert_eq!(initial.iter().map(|f| f.bytes[0]).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(form.take_files("follow_up_evidence").len(), 1);
        assert!(form.take_file("file").is_none());
    }
}
