mod common;

use anyhow::Result;
use chrono::NaiveDate;

use common::{caller, seed_site, seed_tenant, seed_user, seed_variable, setup_db, state, NewUser};
use site_supervision::authz::Role;
use site_supervision::errors::AppError;
use site_supervision::models::work_log::{EvidenceBatch, WorkLogCreateRequest, WorkLogStatus};
use site_supervision::services::{sites, users, work_logs};

fn ids(sites: &[site_supervision::models::site::Site]) -> Vec<i64> {
    let mut ids: Vec<i64> = sites.iter().map(|s| s.id).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn site_visibility_narrows_with_privilege() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);

    let admin_id = seed_user(&db.pool, NewUser::new("root", Role::Admin)).await?;
    let a = seed_tenant(&db.pool, "alpha", "AL01").await?;
    let b = seed_tenant(&db.pool, "beta", "BE01").await?;
    let a_second = seed_site(&db.pool, "AL02", a.director_id, Some(a.director_id), &[a.director_id]).await?;
    // ADMIN-created site with beta's supervisor assigned
    let unattributed = seed_site(&db.pool, "AD01", admin_id, None, &[b.supervisor_id]).await?;

    let admin = caller(&db.pool, admin_id).await?;
    let director_a = caller(&db.pool, a.director_id).await?;
    let supervisor_a = caller(&db.pool, a.supervisor_id).await?;
    let supervisor_b = caller(&db.pool, b.supervisor_id).await?;

    let all = ids(&sites::list_sites(&state, &admin).await?);
    assert_eq!(all, vec![a.site_id, b.site_id, a_second, unattributed]);

    let seen_by_director = ids(&sites::list_sites(&state, &director_a).await?);
    assert_eq!(seen_by_director, vec![a.site_id, a_second]);

    let seen_by_supervisor = ids(&sites::list_sites(&state, &supervisor_a).await?);
    assert!(seen_by_supervisor.iter().all(|id| seen_by_director.contains(id)));
    assert_eq!(seen_by_supervisor, vec![a.site_id, a_second]);

    // tenant rows plus explicit assignment
    let seen_by_b = ids(&sites::list_sites(&state, &supervisor_b).await?);
    assert_eq!(seen_by_b, vec![b.site_id, unattributed]);

    Ok(())
}

#[tokio::test]
async fn single_site_read_is_post_checked() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let a = seed_tenant(&db.pool, "alpha", "AL01").await?;
    let b = seed_tenant(&db.pool, "beta", "BE01").await?;

    let director_a = caller(&db.pool, a.director_id).await?;
    assert_eq!(sites::get_site(&state, &director_a, a.site_id).await?.prefix, "AL01");

    let err = sites::get_site(&state, &director_a, b.site_id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "got {err:?}");

    // existence is checked before ownership
    let err = sites::get_site(&state, &director_a, 9_999).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn supervisor_cannot_read_foreign_work_log() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let variable_id = seed_variable(&db.pool, "Hormigón").await?;

    let own = seed_tenant(&db.pool, "ten", "TE10").await?;
    let foreign = seed_tenant(&db.pool, "eleven", "EL11").await?;

    let foreign_supervisor = caller(&db.pool, foreign.supervisor_id).await?;
    let log = work_logs::create_work_log(
        &state,
        &foreign_supervisor,
        WorkLogCreateRequest {
            site_id: foreign.site_id,
            variable_id,
            contractor_id: None,
            status: WorkLogStatus::Abierta,
            creation_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            location: "Losa nivel 2".into(),
            notes: None,
            follow_up: None,
            commitment_date: None,
            execution_date: None,
            latitude: None,
            longitude: None,
            measurement_id: None,
            unit_id: None,
        },
        EvidenceBatch::default(),
    )
    .await?;

    let outsider = caller(&db.pool, own.supervisor_id).await?;
    assert_eq!(outsider.owner_director_id, Some(own.director_id));
    let err = work_logs::get_work_log(&state, &outsider, log.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "got {err:?}");

    let listed = work_logs::list_work_logs(&state, &outsider, None).await?;
    assert!(listed.is_empty());

    // the responsible party and its director still see it
    let director = caller(&db.pool, foreign.director_id).await?;
    assert_eq!(work_logs::get_work_log(&state, &director, log.id).await?.code, "EL11-01");
    assert_eq!(work_logs::get_work_log(&state, &foreign_supervisor, log.id).await?.id, log.id);
    Ok(())
}

#[tokio::test]
async fn user_listing_is_tenant_scoped() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let a = seed_tenant(&db.pool, "alpha", "AL01").await?;
    let b = seed_tenant(&db.pool, "beta", "BE01").await?;

    let director_a = caller(&db.pool, a.director_id).await?;
    let listed: Vec<i64> = users::list_users(&state, &director_a).await?.iter().map(|u| u.id).collect();
    assert_eq!(listed, vec![a.supervisor_id]);

    let err = users::get_user(&state, &director_a, b.supervisor_id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // staff are not allowed to browse accounts at all
    let supervisor_a = caller(&db.pool, a.supervisor_id).await?;
    let err = users::list_users(&state, &supervisor_a).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    Ok(())
}
