//! Well-known configuration keys and values

/// Extended configuration block holding the IPSec settings of an L2TP interface
pub const EXTENDED_IPSEC: &str = "IPSec";

// PPP
pub const PPP_AUTH_NAME: &str = "AuthName";
pub const PPP_AUTH_PASSWORD_ENCRYPTION: &str = "AuthPasswordEncryption";
pub const PPP_AUTH_PASSWORD_ENCRYPTION_KEYCHAIN: &str = "Keychain";
pub const PPP_COMM_REMOTE_ADDRESS: &str = "CommRemoteAddress";
pub const PPP_DIAL_ON_DEMAND: &str = "DialOnDemand";
pub const PPP_DISCONNECT_ON_IDLE: &str = "DisconnectOnIdle";
pub const PPP_DISCONNECT_ON_LOGOUT: &str = "DisconnectOnLogout";
pub const PPP_DISCONNECT_ON_SLEEP: &str = "DisconnectOnSleep";
pub const PPP_LCP_ECHO_ENABLED: &str = "LCPEchoEnabled";

// IPSec
pub const IPSEC_AUTHENTICATION_METHOD: &str = "AuthenticationMethod";
pub const IPSEC_AUTHENTICATION_METHOD_SHARED_SECRET: &str = "SharedSecret";
pub const IPSEC_SHARED_SECRET: &str = "SharedSecret";
pub const IPSEC_SHARED_SECRET_ENCRYPTION: &str = "SharedSecretEncryption";
pub const IPSEC_SHARED_SECRET_ENCRYPTION_KEYCHAIN: &str = "Keychain";

// IPv4 / IPv6
pub const IPV4_CONFIG_METHOD: &str = "ConfigMethod";
pub const IPV4_CONFIG_METHOD_PPP: &str = "PPP";
pub const IPV6_CONFIG_METHOD: &str = "ConfigMethod";
pub const IPV6_CONFIG_METHOD_AUTOMATIC: &str = "Automatic";
pub const OVERRIDE_PRIMARY: &str = "OverridePrimary";
