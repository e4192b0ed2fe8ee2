mod common;

use anyhow::Result;

use common::{caller, count, seed_user, setup_db, state, NewUser};
use site_supervision::authz::Role;
use site_supervision::errors::AppError;
use site_supervision::models::site::SiteCreateRequest;
use site_supervision::models::user::{UserCreateRequest, UserUpdateRequest};
use site_supervision::models::Patch;
use site_supervision::services::{sites, users};

fn site_request(prefix: &str, responsible: i64) -> SiteCreateRequest {
    SiteCreateRequest {
        prefix: prefix.to_string(),
        name: format!("Obra {prefix}"),
        observations: None,
        responsible_ids: vec![responsible],
    }
}

fn user_request(username: &str, role: Role) -> UserCreateRequest {
    UserCreateRequest {
        username: username.to_string(),
        full_name: format!("{username} full name"),
        password: "password123".to_string(),
        role,
        owner_director_id: None,
        max_users: None,
        max_obras: None,
    }
}

#[tokio::test]
async fn site_ceiling_of_one_blocks_the_second_site() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let director_id = seed_user(&db.pool, NewUser::new("dir", Role::Director).limits(None, Some(1))).await?;
    let director = caller(&db.pool, director_id).await?;

    let first = sites::create_site(&state, &director, site_request("AD24", director_id)).await?;
    assert_eq!(first.director_id, Some(director_id));
    assert_eq!(first.creator_id, director_id);

    let err = sites::create_site(&state, &director, site_request("AD25", director_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded(_)), "got {err:?}");
    assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    assert_eq!(count(&db.pool, "sites").await?, 1);
    Ok(())
}

#[tokio::test]
async fn zero_ceiling_never_blocks() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let director_id = seed_user(&db.pool, NewUser::new("dir", Role::Director).limits(Some(0), Some(0))).await?;
    let director = caller(&db.pool, director_id).await?;

    for prefix in ["A1", "A2", "A3", "A4"] {
        sites::create_site(&state, &director, site_request(prefix, director_id)).await?;
    }
    for name in ["user1", "user2", "user3", "user4", "user5"] {
        users::create_user(&state, &director, user_request(name, Role::Residente)).await?;
    }
    assert_eq!(count(&db.pool, "sites").await?, 4);
    assert_eq!(count(&db.pool, "users").await?, 6);
    Ok(())
}

#[tokio::test]
async fn unset_user_ceiling_defaults_to_three() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let director_id = seed_user(&db.pool, NewUser::new("dir", Role::Director)).await?;
    let director = caller(&db.pool, director_id).await?;

    for name in ["user1", "user2", "user3"] {
        let user = users::create_user(&state, &director, user_request(name, Role::Supervisor)).await?;
        assert_eq!(user.owner_director_id, Some(director_id));
    }
    let err = users::create_user(&state, &director, user_request("user4", Role::Supervisor))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn admin_actions_are_unbounded() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let admin_id = seed_user(&db.pool, NewUser::new("root", Role::Admin)).await?;
    let admin = caller(&db.pool, admin_id).await?;

    for prefix in ["B1", "B2", "B3"] {
        let site = sites::create_site(&state, &admin, site_request(prefix, admin_id)).await?;
        assert_eq!(site.director_id, None);
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_creations_cannot_overshoot_the_ceiling() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let director_id = seed_user(&db.pool, NewUser::new("dir", Role::Director).limits(None, Some(2))).await?;
    let director = caller(&db.pool, director_id).await?;

    let mut handles = Vec::new();
    for n in 0..6 {
        let state = state.clone();
        let director = director.clone();
        handles.push(tokio::spawn(async move {
            sites::create_site(&state, &director, site_request(&format!("C{n}"), director_id)).await
        }));
    }

    let mut created = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => created += 1,
            Err(AppError::QuotaExceeded(_)) => denied += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(created, 2);
    assert_eq!(denied, 4);
    assert_eq!(count(&db.pool, "sites").await?, 2);
    Ok(())
}

#[tokio::test]
async fn director_cannot_create_privileged_accounts_regardless_of_quota() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);

    // one director with room to spare, one with the quota exhausted
    let roomy_id = seed_user(&db.pool, NewUser::new("roomy", Role::Director).limits(Some(10), None)).await?;
    let full_id = seed_user(&db.pool, NewUser::new("full", Role::Director).limits(Some(1), None)).await?;
    seed_user(&db.pool, NewUser::new("full-res", Role::Residente).owned_by(full_id)).await?;

    for director_id in [roomy_id, full_id] {
        let director = caller(&db.pool, director_id).await?;
        for role in [Role::Admin, Role::Director] {
            let err = users::create_user(&state, &director, user_request(&format!("x{director_id}{role}"), role))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)), "{role}: got {err:?}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn admin_cannot_lower_a_ceiling_below_usage() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let admin = caller(&db.pool, seed_user(&db.pool, NewUser::new("root", Role::Admin)).await?).await?;
    let director_id = seed_user(&db.pool, NewUser::new("dir", Role::Director).limits(Some(5), None)).await?;
    for name in ["r1", "r2", "r3"] {
        seed_user(&db.pool, NewUser::new(name, Role::Residente).owned_by(director_id)).await?;
    }

    let lower = UserUpdateRequest {
        max_users: Patch::Set(2),
        ..Default::default()
    };
    let err = users::update_user(&state, &admin, director_id, lower).await.unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded(_)), "got {err:?}");

    let exact = UserUpdateRequest {
        max_users: Patch::Set(3),
        ..Default::default()
    };
    assert_eq!(users::update_user(&state, &admin, director_id, exact).await?.max_users, Some(3));

    // directors may not touch their own limits
    let director = caller(&db.pool, director_id).await?;
    let raise = UserUpdateRequest {
        max_users: Patch::Set(50),
        ..Default::default()
    };
    let err = users::update_user(&state, &director, director_id, raise).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn directors_creating_sites_concurrently_do_not_collide() -> Result<()> {
    let db = setup_db().await?;
    let state = state(&db.pool);
    let first_id = seed_user(&db.pool, NewUser::new("dir-a", Role::Director).limits(None, Some(0))).await?;
    let second_id = seed_user(&db.pool, NewUser::new("dir-b", Role::Director).limits(None, Some(0))).await?;
    let first = caller(&db.pool, first_id).await?;
    let second = caller(&db.pool, second_id).await?;

    let mut handles = Vec::new();
    for n in 0..10 {
        for (director, letter) in [(&first, "A"), (&second, "B")] {
            let state = state.clone();
            let director = director.clone();
            let request = site_request(&format!("{letter}{n}"), director.user_id);
            handles.push(tokio::spawn(async move { sites::create_site(&state, &director, request).await }));
        }
    }

    for handle in handles {
        handle.await??;
    }
    assert_eq!(count(&db.pool, "sites").await?, 20);
    Ok(())
}
