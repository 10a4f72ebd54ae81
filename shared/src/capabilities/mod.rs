mod camera;
mod http;
mod kv;
mod transport;

pub use self::camera::{
    CameraError, CameraOutput, CameraResult, CaptureConfig, ImageFormat, ImageHandle, ImageSource,
    SourceKind, MAX_IMAGE_SIZE_BYTES,
};
pub use self::http::{
    FormPart, HttpError, HttpHeaders, HttpRequest, HttpResponse, HttpResult,
    HttpTransport, RequestBody, ValidatedUrl, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS,
};
pub use self::kv::{
    validate_token, CredentialKey, CredentialStore, InMemoryCredentialStore, KvError,
    StorageErrorCode,
};
pub use self::transport::ReqwestTransport;

