//! Feed posts with their likes and comments.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::identity::Role;

/// A post with its likes and comments attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub author_role: Role,
    pub content: String,
    pub image: String,
    pub created_at: String,
    /// User ids, in the order the likes arrived
    pub liked_by: Vec<String>,
    /// Oldest first
    pub comments: Vec<PostComment>,
}

impl Post {
    pub fn new(author_id: String, author_role: Role, content: String, image: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author_id,
            author_role,
            content,
            image,
            created_at: super::timestamp_now(),
            liked_by: Vec::new(),
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_role: String,
    pub content: String,
    pub image: String,
    pub created_at: String,
}

impl TryFrom<PostRow> for Post {
    type Error = String;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            author_role: row.author_role.parse()?,
            id: row.id,
            author_id: row.author_id,
            content: row.content,
            image: row.image,
            created_at: row.created_at,
            liked_by: Vec::new(),
            comments: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PostComment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub created_at: String,
}

impl PostComment {
    pub fn new(post_id: String, author_id: String, author_name: String, text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            post_id,
            author_id,
            author_name,
            text,
            created_at: super::timestamp_now(),
        }
    }
}

/// Result of a like attempt, decided in one store step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Everyone who has liked the post, this like included
    Liked(Vec<String>),
    AlreadyLiked,
    PostMissing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub id: String,
    pub name: String,
    pub img: String,
}

/// A post as the feed shows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub author: PostAuthor,
    pub author_role: Role,
    pub content: String,
    pub image: String,
    pub likes: usize,
    pub liked_by: Vec<String>,
    pub comments: Vec<PostComment>,
    pub created_at: String,
}

impl PostView {
    pub fn new(post: Post, author: PostAuthor) -> Self {
        Self {
            id: post.id,
            author,
            author_role: post.author_role,
            content: post.content,
            image: post.image,
            likes: post.liked_by.len(),
            liked_by: post.liked_by,
            comments: post.comments,
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    /// URL of an already hosted image
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub likes: usize,
    pub liked_by: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub comments: Vec<PostComment>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
}
