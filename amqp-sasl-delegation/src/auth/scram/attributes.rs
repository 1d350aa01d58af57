//! Attribute keys of RFC 5802 messages

/// Channel binding flag: the client does not support channel binding
pub const GS2_NO_CHANNEL_BINDING: &str = "n";

/// Channel binding flag: the client supports channel binding but thinks the server does not
pub const GS2_CHANNEL_BINDING_UNUSED: &str = "y";

/// Channel binding flag prefix: the client requires channel binding
pub const GS2_CHANNEL_BINDING_REQUIRED: &str = "p=";

/// a: authorization identity, part of the GS2 header
pub const AUTHZID_KEY: &str = "a=";

/// n: the name of the user whose password is used for authentication
pub const USERNAME_KEY: &str = "n=";

/// m: reserved for future mandatory extensions
pub const RESERVED_MEXT: &str = "m=";

/// r: the nonce
pub const NONCE_KEY: &str = "r=";

/// v: base64-encoded ServerSignature in the server-final message
pub const VERIFIER_KEY: &str = "v=";

/// e: error reported in the server-final message
pub const SERVER_ERROR_KEY: &str = "e=";
