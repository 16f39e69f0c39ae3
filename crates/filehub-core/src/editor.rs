//! Signed, stateless editor-session tokens.
//!
//! A session token is a self-contained HS256 JWT: the document URL, the
//! reversible document key, the callback URL and an expiry. Nothing is
//! persisted server-side; validity is re-derived from the signature and the
//! `exp` claim alone, which keeps the server horizontally scalable and
//! restart-safe.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session tokens are valid for one hour from issuance.
const TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("JWT encoding error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("invalid document key: {0}")]
    InvalidKey(String),
}

/// Claims embedded in a session token, shaped for the external editor.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub document: DocumentClaims,
    #[serde(rename = "editorConfig")]
    pub editor_config: EditorConfigClaims,
    pub exp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentClaims {
    pub url: String,
    pub key: String,
    pub permissions: PermissionClaims,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionClaims {
    #[serde(rename = "modifyFilter")]
    pub modify_filter: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditorConfigClaims {
    pub lang: String,
    pub mode: String,
    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
}

/// Everything the editor page needs to bootstrap the external editor client
/// for one file.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub token: String,
    pub document_key: String,
    pub document_url: String,
    pub callback_url: String,
    pub file_name: String,
    pub file_type: String,
    pub doc_type: &'static str,
    pub lang: String,
}

/// Issues and verifies editor-session tokens.
pub struct EditorSession {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    base_url: String,
    lang: String,
}

impl EditorSession {
    /// `base_url` is the externally reachable base the editor fetches
    /// documents from and posts callbacks to, without a trailing slash.
    pub fn new(secret: &str, base_url: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            lang: lang.into(),
        }
    }

    /// Sign a one-hour session token for the given document.
    pub fn issue(
        &self,
        document_url: &str,
        callback_url: &str,
        document_key: &str,
    ) -> Result<String, EditorError> {
        let claims = SessionClaims {
            document: DocumentClaims {
                url: document_url.to_owned(),
                key: document_key.to_owned(),
                permissions: PermissionClaims {
                    modify_filter: false,
                },
            },
            editor_config: EditorConfigClaims {
                lang: self.lang.clone(),
                mode: "edit".to_owned(),
                callback_url: callback_url.to_owned(),
            },
            exp: jsonwebtoken::get_current_timestamp() + TOKEN_TTL_SECS,
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Check structural validity, signature and expiry — nothing else.
    ///
    /// Tokens with an otherwise empty payload are accepted by contract: the
    /// same verification backs bearer-style API calls that carry no document
    /// claims. Never errors; any failure is `false`.
    pub fn verify(&self, token: &str) -> bool {
        let Ok(header) = jsonwebtoken::decode_header(token) else {
            return false;
        };
        let mut validation = Validation::new(header.alg);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims.clear();
        jsonwebtoken::decode::<serde_json::Value>(token, &self.decoding_key, &validation).is_ok()
    }

    /// Reversible encoding of a client-relative path; the join key between a
    /// save-back callback and the stored file.
    pub fn document_key(rel_path: &str) -> String {
        URL_SAFE.encode(rel_path.as_bytes())
    }

    /// Exact inverse of [`EditorSession::document_key`].
    pub fn decode_document_key(key: &str) -> Result<String, EditorError> {
        let bytes = URL_SAFE
            .decode(key)
            .map_err(|e| EditorError::InvalidKey(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| EditorError::InvalidKey(e.to_string()))
    }

    pub fn document_url(&self, rel_path: &str) -> String {
        format!("{}/{}", self.base_url, rel_path.trim_start_matches('/'))
    }

    pub fn callback_url(&self) -> String {
        format!("{}/track", self.base_url)
    }

    /// Build the full session descriptor for one file.
    pub fn descriptor(&self, rel_path: &str) -> Result<SessionDescriptor, EditorError> {
        let file_name = rel_path.trim_start_matches('/').to_owned();
        let ext = file_name.rsplit_once('.').map_or("", |(_, e)| e);
        let document_key = Self::document_key(&file_name);
        let document_url = self.document_url(&file_name);
        let callback_url = self.callback_url();
        let token = self.issue(&document_url, &callback_url, &document_key)?;

        Ok(SessionDescriptor {
            token,
            document_key,
            document_url,
            callback_url,
            file_type: ext.to_owned(),
            doc_type: doc_type(ext),
            lang: self.lang.clone(),
            file_name,
        })
    }
}

/// Editor document family for a file extension.
pub fn doc_type(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "xls" | "xlsx" | "ods" | "csv" | "ots" => "cell",
        "ppt" | "pptx" | "odp" | "otp" | "pps" => "slide",
        "djvu" | "oxps" | "pdf" | "xps" => "pdf",
        "vsdm" | "vsdx" | "vssm" | "vssx" | "vstm" | "vstx" => "diagram",
        _ => "word",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> EditorSession {
        EditorSession::new("test-secret", "http://files.local/d", "ru")
    }

    #[test]
    fn issued_token_verifies() {
        let s = session();
        let token = s.issue("http://files.local/d/a.docx", "http://files.local/track", "abc").unwrap();
        assert!(s.verify(&token));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = session().issue("u", "c", "k").unwrap();
        let other = EditorSession::new("different-secret", "http://files.local/d", "ru");
        assert!(!other.verify(&token));
    }

    #[test]
    fn garbage_is_rejected_without_panicking() {
        let s = session();
        assert!(!s.verify(""));
        assert!(!s.verify("not.a.jwt"));
        assert!(!s.verify("a.b"));
    }

    #[test]
    fn empty_payload_token_is_accepted() {
        // Bearer-style API tokens carry no document claims.
        let claims = serde_json::json!({});
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(session().verify(&token));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = serde_json::json!({
            "exp": jsonwebtoken::get_current_timestamp() - 120,
        });
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(!session().verify(&token));
    }

    #[test]
    fn document_key_round_trips() {
        for path in ["doc.txt", "папка/отчёт.docx", "a/b/c.tar.gz", "x?&=.bin"] {
            let key = EditorSession::document_key(path);
            assert_eq!(EditorSession::decode_document_key(&key).unwrap(), path);
        }
    }

    #[test]
    fn descriptor_wires_urls_and_types() {
        let d = session().descriptor("/reports/q3.xlsx").unwrap();
        assert_eq!(d.file_name, "reports/q3.xlsx");
        assert_eq!(d.file_type, "xlsx");
        assert_eq!(d.doc_type, "cell");
        assert_eq!(d.document_url, "http://files.local/d/reports/q3.xlsx");
        assert_eq!(d.callback_url, "http://files.local/d/track");
        assert_eq!(
            EditorSession::decode_document_key(&d.document_key).unwrap(),
            "reports/q3.xlsx"
        );
    }

    #[test]
    fn doc_type_mapping() {
        assert_eq!(doc_type("docx"), "word");
        assert_eq!(doc_type("pdf"), "pdf");
        assert_eq!(doc_type("pptx"), "slide");
        assert_eq!(doc_type("vsdx"), "diagram");
        assert_eq!(doc_type(""), "word");
    }
}
