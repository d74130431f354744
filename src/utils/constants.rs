pub const NOTIFICATION_SUBJECT: &str = "Receta Agregada con Éxito";

pub const DEFAULT_RECORD_PREFIX: &str = "receta:";
pub const DEFAULT_QUEUE_PREFIX: &str = "recetario";
pub const DEFAULT_QUEUE_NAME: &str = "notifications";

pub const FIELD_INGREDIENTS: &str = "ingredients";
pub const FIELD_STEPS: &str = "steps";

pub const FLASH_COOKIE: &str = "flash";
pub const DEAD_LETTER_PAGE: usize = 20;
