use uuid::Uuid;

use crate::{
    domain::{
        class::{ClassChanges, ClassField, ClassSession, NewClass},
        search::{Page, Query, SearchOptions},
    },
    ports::{
        bookings::BookingStorePort, classes::ClassRegistryPort,
        memberships::MembershipStorePort, users::UserStorePort,
    },
};

use super::{DomainLogic, Error};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateClass {
    pub class: NewClass,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetClass {
    pub class_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateClass {
    pub class_id: Uuid,
    pub changes: ClassChanges,
}

/// Purge a class record
///
/// Bookings that reference it are kept and show no class details afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteClass {
    pub class_id: Uuid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchClasses {
    pub options: SearchOptions,
}

command!(CreateClass => ClassSession, create_class);
command!(GetClass => ClassSession, get_class);
command!(UpdateClass => ClassSession, update_class);
command!(DeleteClass => (), delete_class);
command!(SearchClasses => Page<ClassSession>, search_classes);

impl<C, U, B, M> DomainLogic<C, U, B, M>
where
    C: ClassRegistryPort + ?Sized,
    U: UserStorePort + ?Sized,
    B: BookingStorePort + ?Sized,
    M: MembershipStorePort + ?Sized,
{
    async fn create_class(&self, req: CreateClass) -> Result<ClassSession, Error> {
        let class = ClassSession::create(req.class)
            .map_err(|err| Error::InvalidRequest(err.to_string().into()))?;
        let class = self.classes.insert_class(class).await?;

        tracing::info!(class_id = %class.id, title = %class.title, "class created");
        Ok(class)
    }

    async fn get_class(&self, req: GetClass) -> Result<ClassSession, Error> {
        Ok(self.classes.get_class(req.class_id).await?)
    }

    async fn update_class(&self, req: UpdateClass) -> Result<ClassSession, Error> {
        Ok(self.classes.update_class(req.class_id, req.changes).await?)
    }

    async fn delete_class(&self, req: DeleteClass) -> Result<(), Error> {
        self.classes.delete_class(req.class_id).await?;

        tracing::info!(class_id = %req.class_id, "class deleted");
        Ok(())
    }

    async fn search_classes(&self, req: SearchClasses) -> Result<Page<ClassSession>, Error> {
        let query = Query::<ClassField>::from_options(req.options)?;
        Ok(self.classes.search_classes(query).await?)
    }
}
