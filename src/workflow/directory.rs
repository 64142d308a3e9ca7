//! Member directory: public alumni and student views, a member's own profile,
//! and password changes.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use super::registration::hash_password;
use super::{WorkflowError, WorkflowResult};
use crate::crypto;
use crate::db::{
    AlumniProfile, Identity, ProfileDetails, ProfileUpdate, Role, StudentCard, StudentProfile,
};
use crate::store::{IdentityStore, ProfileStore};

#[derive(Clone)]
pub struct DirectoryWorkflow {
    identities: Arc<dyn IdentityStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl DirectoryWorkflow {
    pub fn new(identities: Arc<dyn IdentityStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            identities,
            profiles,
        }
    }

    async fn details(&self, identity_id: &str) -> WorkflowResult<ProfileDetails> {
        Ok(self
            .profiles
            .find_details(identity_id)
            .await?
            .unwrap_or_else(|| ProfileDetails::empty(identity_id)))
    }

    async fn identity_with_role(&self, id: &str, role: Role) -> WorkflowResult<Option<Identity>> {
        Ok(self
            .identities
            .find_by_id(id)
            .await?
            .filter(|identity| identity.role() == role))
    }

    /// Every alumni with their directory details, oldest account first
    pub async fn alumni_directory(&self) -> WorkflowResult<Vec<AlumniProfile>> {
        let alumni = self.identities.list_by_role(Role::Alumni).await?;
        let mut details: HashMap<String, ProfileDetails> = self
            .profiles
            .details_for_role(Role::Alumni)
            .await?
            .into_iter()
            .map(|d| (d.identity_id.clone(), d))
            .collect();

        Ok(alumni
            .iter()
            .map(|identity| {
                let d = details
                    .remove(&identity.id)
                    .unwrap_or_else(|| ProfileDetails::empty(&identity.id));
                AlumniProfile::new(identity, &d)
            })
            .collect())
    }

    pub async fn alumni_ids(&self) -> WorkflowResult<Vec<String>> {
        Ok(self
            .identities
            .list_by_role(Role::Alumni)
            .await?
            .into_iter()
            .map(|identity| identity.id)
            .collect())
    }

    pub async fn alumni_profile(&self, id: &str) -> WorkflowResult<AlumniProfile> {
        let identity = self
            .identity_with_role(id, Role::Alumni)
            .await?
            .ok_or(WorkflowError::NotFound("Alumni not found"))?;
        let details = self.details(id).await?;
        Ok(AlumniProfile::new(&identity, &details))
    }

    /// The caller's own alumni profile
    pub async fn own_alumni_profile(&self, caller: &str, role: Role) -> WorkflowResult<AlumniProfile> {
        if role != Role::Alumni {
            return Err(WorkflowError::Forbidden("Access denied"));
        }
        self.alumni_profile(caller)
            .await
            .map_err(|e| match e {
                WorkflowError::NotFound(_) => WorkflowError::NotFound("Profile not found"),
                other => other,
            })
    }

    #[instrument(skip(self, update))]
    pub async fn update_alumni_profile(
        &self,
        caller: &str,
        role: Role,
        update: ProfileUpdate,
    ) -> WorkflowResult<AlumniProfile> {
        let identity = match role {
            Role::Alumni => self.identity_with_role(caller, Role::Alumni).await?,
            _ => return Err(WorkflowError::Forbidden("Access denied")),
        }
        .ok_or(WorkflowError::NotFound("Profile not found"))?;

        let mut details = self.details(caller).await?;
        details.apply(update);
        self.profiles.upsert_details(&details).await?;

        info!(alumni_id = %caller, "Alumni profile updated");
        Ok(AlumniProfile::new(&identity, &details))
    }

    /// The caller's own student profile
    pub async fn own_student_profile(&self, caller: &str, role: Role) -> WorkflowResult<StudentProfile> {
        if role != Role::Student {
            return Err(WorkflowError::Forbidden("Access denied"));
        }
        let identity = self
            .identity_with_role(caller, Role::Student)
            .await?
            .ok_or(WorkflowError::NotFound("Student not found"))?;
        let details = self.details(caller).await?;

        Ok(StudentProfile {
            roster_id: identity.profile.roster_id().unwrap_or_default().to_string(),
            id: identity.id,
            name: identity.name,
            email: identity.email,
            role: Role::Student,
            img: details.img.unwrap_or_default(),
        })
    }

    /// Name and photo of a student, visible to any member
    pub async fn student_card(&self, id: &str) -> WorkflowResult<StudentCard> {
        let identity = self
            .identity_with_role(id, Role::Student)
            .await?
            .ok_or(WorkflowError::NotFound("Student not found"))?;
        let details = self.details(id).await?;

        Ok(StudentCard {
            id: identity.id,
            name: identity.name,
            img: details.img.unwrap_or_default(),
        })
    }

    /// Replace the caller's password after checking the current one
    #[instrument(skip_all, fields(caller = %caller))]
    pub async fn change_password(
        &self,
        caller: &str,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> WorkflowResult<()> {
        if old_password.is_empty() || new_password.is_empty() || confirm_password.is_empty() {
            return Err(WorkflowError::MissingFields("All password fields are required."));
        }
        if new_password != confirm_password {
            return Err(WorkflowError::Validation {
                field: "confirmPassword",
                message: "New passwords do not match.".to_string(),
            });
        }

        let identity = self
            .identities
            .find_by_id(caller)
            .await?
            .ok_or(WorkflowError::NotFound("Profile not found"))?;

        let old_password = old_password.to_string();
        let digest = identity.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || crypto::verify_password(&old_password, &digest))
            .await
            .map_err(|e| WorkflowError::internal("Password verification task failed", e))?;
        if !valid {
            return Err(WorkflowError::Validation {
                field: "oldPassword",
                message: "Old password is incorrect.".to_string(),
            });
        }

        let password_hash = hash_password(new_password.to_string()).await?;
        if !self
            .identities
            .update_password_hash(caller, &password_hash)
            .await?
        {
            return Err(WorkflowError::NotFound("Profile not found"));
        }

        info!("Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Profile, SkillsInput};
    use crate::store::MemoryStore;
    use tokio_test::{assert_err, assert_ok};

    async fn setup() -> (Arc<MemoryStore>, DirectoryWorkflow) {
        let store = Arc::new(MemoryStore::new());
        let password_hash = crypto::hash_password("old password").unwrap();
        for (id, profile) in [
            ("s1", Profile::Student { roster_id: "PRN001".into() }),
            ("a1", Profile::Alumni { graduation_year: Some("2018".into()) }),
            ("a2", Profile::Alumni { graduation_year: None }),
            ("t1", Profile::Teacher),
        ] {
            store
                .insert_identity(&Identity {
                    id: id.into(),
                    email: format!("{}@example.edu", id),
                    name: format!("Member {}", id),
                    password_hash: password_hash.clone(),
                    profile,
                    created_at: crate::db::timestamp_now(),
                })
                .await
                .unwrap();
        }
        let workflow = DirectoryWorkflow::new(store.clone(), store.clone());
        (store, workflow)
    }

    #[tokio::test]
    async fn test_alumni_directory_lists_only_alumni() {
        let (_, wf) = setup().await;
        wf.update_alumni_profile(
            "a1",
            Role::Alumni,
            ProfileUpdate {
                skills: Some(SkillsInput::Csv("rust, sql".into())),
                company: Some("Acme".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let directory = wf.alumni_directory().await.unwrap();
        let ids: Vec<&str> = directory.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(directory[0].skills, vec!["rust", "sql"]);
        assert_eq!(directory[0].company, "Acme");
        assert_eq!(directory[0].graduation_year.as_deref(), Some("2018"));
        assert!(directory[1].skills.is_empty());

        assert_eq!(wf.alumni_ids().await.unwrap(), vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_profile_lookups_check_role() {
        let (_, wf) = setup().await;
        assert_eq!(wf.alumni_profile("a2").await.unwrap().name, "Member a2");
        assert!(matches!(
            wf.alumni_profile("s1").await,
            Err(WorkflowError::NotFound("Alumni not found"))
        ));

        let card = wf.student_card("s1").await.unwrap();
        assert_eq!((card.id.as_str(), card.img.as_str()), ("s1", ""));
        assert_err!(wf.student_card("a1").await);
    }

    #[tokio::test]
    async fn test_own_profile_requires_matching_role() {
        let (_, wf) = setup().await;

        let me = wf.own_student_profile("s1", Role::Student).await.unwrap();
        assert_eq!(me.roster_id, "PRN001");
        assert!(matches!(
            wf.own_student_profile("a1", Role::Alumni).await,
            Err(WorkflowError::Forbidden(_))
        ));

        assert_ok!(wf.own_alumni_profile("a1", Role::Alumni).await);
        assert!(matches!(
            wf.own_alumni_profile("t1", Role::Teacher).await,
            Err(WorkflowError::Forbidden(_))
        ));
        assert!(matches!(
            wf.update_alumni_profile("s1", Role::Student, ProfileUpdate::default())
                .await,
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (store, wf) = setup().await;

        assert!(matches!(
            wf.change_password("s1", "", "new password", "new password").await,
            Err(WorkflowError::MissingFields(_))
        ));
        assert!(matches!(
            wf.change_password("s1", "old password", "new password", "other password").await,
            Err(WorkflowError::Validation { field: "confirmPassword", .. })
        ));
        assert!(matches!(
            wf.change_password("s1", "wrong password", "new password", "new password").await,
            Err(WorkflowError::Validation { field: "oldPassword", .. })
        ));

        assert_ok!(wf.change_password("s1", "old password", "new password", "new password").await);
        let digest = store.find_by_id("s1").await.unwrap().unwrap().password_hash;
        assert!(crypto::verify_password("new password", &digest));
        assert!(!crypto::verify_password("old password", &digest));
    }
}
