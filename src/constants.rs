// Storage configuration
pub const DEFAULT_DATA_PATH: &str = "data";
pub const DATABASE_FILE: &str = "expenses.db";
pub const EXPENSES_COLLECTION: &str = "expenses";
pub const ACCOUNTS_COLLECTION: &str = "accounts";

// Account defaults
pub const DEFAULT_ACCOUNT: &str = "USD";
pub const DEFAULT_CATEGORY_ID: &str = "8";

// Validation limits
pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_CATEGORY_NAME_LENGTH: usize = 100;
pub const MAX_ACCOUNT_LENGTH: usize = 50;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MIN_PASSWORD_LENGTH: usize = 6;

// Error messages
pub const ERR_NOT_AUTHENTICATED: &str = "User not authenticated";
pub const ERR_UNAUTHORIZED: &str = "You do not have access to this record";
pub const ERR_UNKNOWN_CATEGORY: &str = "Please select a valid category";
pub const ERR_EMPTY_PATCH: &str = "At least one field must be provided for update";
