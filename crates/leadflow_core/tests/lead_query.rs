use leadflow_core::db::open_db_in_memory;
use leadflow_core::{
    Lead, LeadListQuery, LeadRepository, LeadUpdate, NewLead, SortField, SqliteLeadRepository,
    Stage,
};
use rusqlite::{params, Connection};

/// Creates `count` leads with `created_at = (i + 1) * 1000` for lead `i`.
fn seed(conn: &Connection, repo: &SqliteLeadRepository<'_>, count: usize) -> Vec<Lead> {
    (0..count)
        .map(|index| {
            let lead = repo
                .create(&NewLead::new(
                    format!("Lead {index}"),
                    format!("lead{index}@example.com"),
                    format!("Company {index}"),
                ))
                .expect("create seeded lead");
            set_created_at(conn, &lead, (index as i64 + 1) * 1000);
            repo.get(&lead.id.to_string())
                .expect("reload seeded lead")
        })
        .collect()
}

fn set_created_at(conn: &Connection, lead: &Lead, millis: i64) {
    conn.execute(
        "UPDATE leads SET created_at = ?1 WHERE id = ?2;",
        params![millis, lead.id.to_string()],
    )
    .expect("set created_at");
}

fn ids(leads: &[Lead]) -> Vec<String> {
    leads.iter().map(|lead| lead.id.to_string()).collect()
}

fn page_query(page: u64, page_size: u32) -> LeadListQuery {
    LeadListQuery {
        sort_by: SortField::CreatedAt,
        sort_desc: false,
        limit: Some(page_size),
        offset: (page - 1) * u64::from(page_size),
        ..LeadListQuery::default()
    }
}

#[test]
fn pages_slice_the_full_sorted_result() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let seeded = seed(&conn, &repo, 7);

    let full = repo
        .get_multi(&LeadListQuery {
            sort_by: SortField::CreatedAt,
            sort_desc: false,
            ..LeadListQuery::default()
        })
        .unwrap();
    assert_eq!(ids(&full), ids(&seeded));

    assert_eq!(ids(&repo.get_multi(&page_query(1, 3)).unwrap()), ids(&full[0..3]));
    assert_eq!(ids(&repo.get_multi(&page_query(2, 3)).unwrap()), ids(&full[3..6]));
    assert_eq!(ids(&repo.get_multi(&page_query(3, 3)).unwrap()), ids(&full[6..7]));
    assert!(repo.get_multi(&page_query(4, 3)).unwrap().is_empty());
    assert_eq!(repo.get_count(None).unwrap(), 7);
}

#[test]
fn descending_sort_reverses_order() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let mut seeded = seed(&conn, &repo, 4);
    seeded.reverse();

    let listed = repo.get_multi(&LeadListQuery::default()).unwrap();
    assert_eq!(ids(&listed), ids(&seeded));
}

#[test]
fn search_matches_name_email_or_company_case_insensitively() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let by_name = repo
        .create(&NewLead::new("Ada ACME-fan", "ada@one.io", "Analytical"))
        .unwrap();
    let by_email = repo
        .create(&NewLead::new("Bob", "bob@acme.com", "Builders"))
        .unwrap();
    let by_company = repo
        .create(&NewLead::new("Cy", "cy@three.io", "Acme Corp"))
        .unwrap();
    repo.create(&NewLead::new("Dee", "dee@four.io", "Dynamics"))
        .unwrap();

    let query = LeadListQuery {
        search: Some("aCmE".to_string()),
        sort_by: SortField::Name,
        sort_desc: false,
        ..LeadListQuery::default()
    };
    let found = repo.get_multi(&query).unwrap();
    assert_eq!(ids(&found), ids(&[by_name, by_email, by_company]));
    assert_eq!(repo.get_count(Some("aCmE")).unwrap(), 3);
}

#[test]
fn count_matches_unpaginated_result_for_every_search() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    seed(&conn, &repo, 12);

    for search in [None, Some(""), Some("lead1"), Some("company"), Some("nomatch")] {
        let query = LeadListQuery {
            search: search.map(str::to_string),
            ..LeadListQuery::default()
        };
        let all = repo.get_multi(&query).unwrap();
        assert_eq!(
            repo.get_count(search).unwrap(),
            all.len() as u64,
            "search {search:?}"
        );
    }
    assert_eq!(repo.get_count(Some("lead1")).unwrap(), 3);
}

#[test]
fn search_folds_non_ascii_case() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let jurgen = repo
        .create(&NewLead::new("Jürgen MÜLLER", "j@x.com", "Ärzte GmbH"))
        .expect("create lead");
    repo.create(&NewLead::new("Hans Mueller", "h@x.com", "Aerzte AG"))
        .expect("create lead");

    let query = LeadListQuery {
        search: Some("müller".to_string()),
        ..LeadListQuery::default()
    };
    assert_eq!(ids(&repo.get_multi(&query).unwrap()), ids(&[jurgen]));
    assert_eq!(repo.get_count(Some("ärzte")).unwrap(), 1);
    assert_eq!(repo.get_count(Some("JÜRGEN")).unwrap(), 1);
}

#[test]
fn wildcards_in_search_are_literal() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let literal = repo
        .create(&NewLead::new("100% Leads", "pct@x.com", "Percent"))
        .unwrap();
    repo.create(&NewLead::new("1000 Leads", "k@x.com", "Kilo"))
        .unwrap();
    repo.create(&NewLead::new("a_b", "ab@x.com", "Under"))
        .unwrap();

    let query = LeadListQuery {
        search: Some("0%".to_string()),
        ..LeadListQuery::default()
    };
    assert_eq!(ids(&repo.get_multi(&query).unwrap()), ids(&[literal]));
    assert_eq!(repo.get_count(Some("_")).unwrap(), 1);
}

#[test]
fn equal_sort_keys_are_ordered_by_id_ascending() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let seeded = seed(&conn, &repo, 5);
    for lead in &seeded {
        set_created_at(&conn, lead, 5000);
    }
    let mut expected = ids(&seeded);
    expected.sort();

    for sort_desc in [true, false] {
        let query = LeadListQuery {
            sort_by: SortField::CreatedAt,
            sort_desc,
            ..LeadListQuery::default()
        };
        assert_eq!(ids(&repo.get_multi(&query).unwrap()), expected);
    }

    let first_page = repo
        .get_multi(&LeadListQuery {
            limit: Some(2),
            ..LeadListQuery::default()
        })
        .unwrap();
    let second_page = repo
        .get_multi(&LeadListQuery {
            limit: Some(2),
            offset: 2,
            ..LeadListQuery::default()
        })
        .unwrap();
    assert_eq!(ids(&first_page), expected[0..2]);
    assert_eq!(ids(&second_page), expected[2..4]);
}

#[test]
fn stage_sort_follows_pipeline_order() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let seeded = seed(&conn, &repo, 3);
    let stages = [Stage::ClosedWon, Stage::NewLead, Stage::MeetingScheduled];
    for (lead, stage) in seeded.iter().zip(stages) {
        let update = LeadUpdate {
            current_stage: Some(stage),
            ..LeadUpdate::default()
        };
        repo.update(&lead.id.to_string(), &update).unwrap();
    }

    let query = LeadListQuery {
        sort_by: SortField::CurrentStage,
        sort_desc: false,
        ..LeadListQuery::default()
    };
    let listed = repo.get_multi(&query).unwrap();
    let listed_stages = listed
        .iter()
        .map(|lead| lead.current_stage)
        .collect::<Vec<_>>();
    assert_eq!(
        listed_stages,
        vec![Stage::NewLead, Stage::MeetingScheduled, Stage::ClosedWon]
    );
}

#[test]
fn listed_leads_carry_full_stage_history() {
    let conn = open_db_in_memory().expect("open in-memory db");
    let repo = SqliteLeadRepository::new(&conn);
    let lead = seed(&conn, &repo, 1).remove(0);
    let update = LeadUpdate {
        current_stage: Some(Stage::ProposalSent),
        ..LeadUpdate::default()
    };
    repo.update(&lead.id.to_string(), &update).unwrap();

    let listed = repo.get_multi(&LeadListQuery::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].stage_history.len(), 2);
}
