use sqlx::FromRow;

#[derive(FromRow, Debug, Clone)]
pub struct Content {
    pub id: i64,
    pub kind: String,
    pub status: String,
    pub title: String,
    pub published_at: i64,
    pub edit_url: String,
    pub permalink: String,
}
