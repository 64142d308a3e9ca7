//! The shared post feed. Alumni and placement officers post; any member can
//! like once and comment.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{WorkflowError, WorkflowResult, POSTS_CREATED_TOTAL};
use crate::db::{LikeOutcome, Post, PostAuthor, PostComment, PostView, Role};
use crate::store::{IdentityStore, PostStore, ProfileStore};

const MAX_POST_LEN: usize = 5000;
const MAX_COMMENT_LEN: usize = 1000;

#[derive(Clone)]
pub struct FeedWorkflow {
    posts: Arc<dyn PostStore>,
    identities: Arc<dyn IdentityStore>,
    profiles: Arc<dyn ProfileStore>,
}

fn bounded_text(text: &str, field: &'static str, max: usize, missing: &str) -> WorkflowResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(WorkflowError::Validation {
            field,
            message: missing.to_string(),
        });
    }
    if text.chars().count() > max {
        return Err(WorkflowError::Validation {
            field,
            message: format!("Must be at most {} characters", max),
        });
    }
    Ok(text.to_string())
}

impl FeedWorkflow {
    pub fn new(
        posts: Arc<dyn PostStore>,
        identities: Arc<dyn IdentityStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            posts,
            identities,
            profiles,
        }
    }

    async fn author(&self, id: &str) -> WorkflowResult<PostAuthor> {
        let name = self
            .identities
            .find_by_id(id)
            .await?
            .map(|identity| identity.name)
            .unwrap_or_default();
        let img = self
            .profiles
            .find_details(id)
            .await?
            .and_then(|d| d.img)
            .unwrap_or_default();
        Ok(PostAuthor {
            id: id.to_string(),
            name,
            img,
        })
    }

    #[instrument(skip(self, content, image))]
    pub async fn create_post(
        &self,
        caller: &str,
        content: &str,
        image: Option<&str>,
    ) -> WorkflowResult<PostView> {
        let identity = self
            .identities
            .find_by_id(caller)
            .await?
            .ok_or(WorkflowError::Forbidden("Only alumni can post"))?;
        if !matches!(identity.role(), Role::Alumni | Role::PlacementOfficer) {
            return Err(WorkflowError::Forbidden("Only alumni can post"));
        }

        let content = bounded_text(content, "content", MAX_POST_LEN, "Post content is required")?;
        let image = image.map(str::trim).unwrap_or_default().to_string();

        let post = Post::new(identity.id.clone(), identity.role(), content, image);
        self.posts.insert_post(&post).await?;

        info!(post_id = %post.id, "Post created");
        metrics::counter!(POSTS_CREATED_TOTAL).increment(1);

        let author = self.author(&identity.id).await?;
        Ok(PostView::new(post, author))
    }

    /// Newest first, with author name and photo
    pub async fn feed(&self) -> WorkflowResult<Vec<PostView>> {
        let posts = self.posts.list_posts().await?;

        let mut authors: HashMap<String, PostAuthor> = HashMap::new();
        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            let author = match authors.get(&post.author_id) {
                Some(author) => author.clone(),
                None => {
                    let author = self.author(&post.author_id).await?;
                    authors.insert(post.author_id.clone(), author.clone());
                    author
                }
            };
            views.push(PostView::new(post, author));
        }
        Ok(views)
    }

    /// Only the author may delete a post
    #[instrument(skip(self))]
    pub async fn delete_post(&self, caller: &str, post_id: &str) -> WorkflowResult<()> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(WorkflowError::NotFound("Post not found"))?;
        if post.author_id != caller {
            return Err(WorkflowError::Forbidden("You can only delete your own posts"));
        }
        if !self.posts.delete_post(post_id).await? {
            return Err(WorkflowError::NotFound("Post not found"));
        }
        info!("Post deleted");
        Ok(())
    }

    /// Like a post once. Returns everyone who has liked it.
    pub async fn like(&self, caller: &str, post_id: &str) -> WorkflowResult<Vec<String>> {
        match self.posts.like_post(post_id, caller).await? {
            LikeOutcome::Liked(liked_by) => Ok(liked_by),
            LikeOutcome::AlreadyLiked => Err(WorkflowError::AlreadyLiked),
            LikeOutcome::PostMissing => Err(WorkflowError::NotFound("Post not found")),
        }
    }

    /// Add a comment and return the post's comments, oldest first
    pub async fn comment(&self, caller: &str, post_id: &str, text: &str) -> WorkflowResult<Vec<PostComment>> {
        let text = bounded_text(text, "text", MAX_COMMENT_LEN, "Comment text is required")?;
        let author = self.author(caller).await?;

        let comment = PostComment::new(post_id.to_string(), caller.to_string(), author.name, text);
        if !self.posts.add_comment(&comment).await? {
            return Err(WorkflowError::NotFound("Post not found"));
        }

        Ok(self
            .posts
            .find_post(post_id)
            .await?
            .map(|post| post.comments)
            .unwrap_or_else(|| vec![comment]))
    }
}
