//! Inbound request bodies, response payloads and the envelope shared by every
//! endpoint.

mod data_url;
mod envelope;
mod requests;
mod responses;

pub use data_url::{encode_data_url, parse_image_data_url, DataUrlError, ImageDataUrl};
pub use envelope::{
    ApiResponse, STATUS_BAD_REQUEST, STATUS_GATEWAY_TIMEOUT, STATUS_INTERNAL, STATUS_OK,
    STATUS_TOO_MANY_REQUESTS, STATUS_UNAUTHORIZED, STATUS_UNAVAILABLE, STATUS_UNPROCESSABLE,
    STATUS_UNSUPPORTED_MEDIA_TYPE,
};
pub use requests::{
    ChatRequest, KanjiImageRequest, Language, LookupRequest, RecognizeRequest, RequestError,
    TranslateRequest, VocabularyRequest, CHAT_MESSAGE_MAX_CHARS, TRANSLATE_TEXT_MAX_CHARS,
    VOCABULARY_DEFAULT_COUNT, VOCABULARY_MAX_COUNT,
};
pub use responses::{ChatReply, KanjiImage, TranslationResult, VocabularyList, VocabularyWord};
